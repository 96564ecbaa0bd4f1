// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Second Factor
//!
//! TOTP verification and one-shot backup codes gating the vault after a
//! successful primary unlock.
//!
//! - TOTP codes are checked with a tolerance of one step in either
//!   direction around `floor(unix_time / period)`
//! - Backup codes have the form `XXXX-XXXX` over `[A-Z0-9]`; only salted
//!   SHA-256 digests are stored, comparison is constant-time, and a
//!   matched code is removed from the set before the caller proceeds

use base32::Alphabet;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm as TotpRsAlgorithm, TOTP};
use zeroize::Zeroize;

use strongbox_domain::entities::record::TotpAlgorithm;
use strongbox_domain::entities::TwoFactorConfig;
use strongbox_domain::VaultError;

/// Number of backup codes issued per configuration.
pub const BACKUP_CODE_COUNT: usize = 10;

/// The alphabet backup codes are drawn from.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A freshly generated second-factor configuration.
///
/// `backup_codes` holds the only plaintext copy of the codes; the caller
/// must surface them to the user once and drop them.
pub struct GeneratedSecondFactor {
    pub config: TwoFactorConfig,
    pub backup_codes: Vec<String>,
}

fn to_totp_rs_algorithm(algorithm: TotpAlgorithm) -> TotpRsAlgorithm {
    match algorithm {
        TotpAlgorithm::Sha1 => TotpRsAlgorithm::SHA1,
        TotpAlgorithm::Sha256 => TotpRsAlgorithm::SHA256,
        TotpAlgorithm::Sha512 => TotpRsAlgorithm::SHA512,
    }
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, VaultError> {
    base32::decode(Alphabet::RFC4648 { padding: false }, secret.trim_end_matches('='))
        .ok_or_else(|| VaultError::invalid_config("TOTP secret is not valid base32"))
}

/// Generates a fresh configuration: random secret, salted backup codes.
pub fn generate_config(secret: Option<String>) -> Result<GeneratedSecondFactor, VaultError> {
    let secret = match secret {
        Some(secret) => secret,
        None => {
            let mut raw = [0u8; 20];
            OsRng.fill_bytes(&mut raw);
            base32::encode(Alphabet::RFC4648 { padding: false }, &raw)
        }
    };
    decode_secret(&secret)?;

    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let code_salt = hex::encode(salt);

    let mut backup_codes = Vec::with_capacity(BACKUP_CODE_COUNT);
    let mut hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
    for _ in 0..BACKUP_CODE_COUNT {
        let code = generate_backup_code();
        hashes.push(hash_backup_code(&code_salt, &code));
        backup_codes.push(code);
    }

    Ok(GeneratedSecondFactor {
        config: TwoFactorConfig {
            enabled: true,
            secret,
            algorithm: TotpAlgorithm::Sha1,
            digits: 6,
            period: 30,
            backup_codes: hashes,
            code_salt,
        },
        backup_codes,
    })
}

fn generate_backup_code() -> String {
    let mut chars = [0u8; 8];
    for slot in chars.iter_mut() {
        // Rejection sampling keeps the alphabet distribution uniform
        loop {
            let mut byte = [0u8; 1];
            OsRng.fill_bytes(&mut byte);
            if (byte[0] as usize) < CODE_ALPHABET.len() * (256 / CODE_ALPHABET.len()) {
                *slot = CODE_ALPHABET[byte[0] as usize % CODE_ALPHABET.len()];
                break;
            }
        }
    }
    format!(
        "{}-{}",
        std::str::from_utf8(&chars[..4]).unwrap_or_default(),
        std::str::from_utf8(&chars[4..]).unwrap_or_default()
    )
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn hash_backup_code(code_salt_hex: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_salt_hex.as_bytes());
    hasher.update(normalize_code(code).as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds the TOTP evaluator for a configuration.
///
/// `TOTP::new_unchecked` is used deliberately: the RFC 6238 constructor
/// insists on 128-bit secrets, while imported authenticator secrets are
/// frequently 80 bits. Parameter ranges are enforced by the domain config.
fn evaluator(config: &TwoFactorConfig) -> Result<TOTP, VaultError> {
    let mut secret = decode_secret(&config.secret)?;
    let totp = TOTP::new_unchecked(
        to_totp_rs_algorithm(config.algorithm),
        config.digits as usize,
        1,
        config.period,
        secret.clone(),
    );
    secret.zeroize();
    Ok(totp)
}

/// Verifies a TOTP code at the given time with a one-step tolerance window.
pub fn verify_totp(
    config: &TwoFactorConfig,
    code: &str,
    now_secs: u64,
) -> Result<bool, VaultError> {
    Ok(evaluator(config)?.check(code.trim(), now_secs))
}

/// Generates the current TOTP code; used by tests and by password-record
/// TOTP display.
pub fn generate_totp(config: &TwoFactorConfig, now_secs: u64) -> Result<String, VaultError> {
    Ok(evaluator(config)?.generate(now_secs))
}

/// The current code for a password record's embedded TOTP secret.
pub fn record_totp_code(
    totp: &strongbox_domain::entities::TotpConfig,
    now_secs: u64,
) -> Result<String, VaultError> {
    totp.validate()?;
    let mut secret = decode_secret(&totp.secret)?;
    let evaluator = TOTP::new_unchecked(
        to_totp_rs_algorithm(totp.algorithm),
        totp.digits as usize,
        1,
        totp.period,
        secret.clone(),
    );
    secret.zeroize();
    Ok(evaluator.generate(now_secs))
}

/// Checks a backup code and consumes it on success.
///
/// Every stored digest is compared in constant time; a match removes
/// exactly that digest from the set. The caller persists the mutated
/// configuration before reporting success, making consumption atomic with
/// the unlock.
pub fn verify_and_consume_backup_code(config: &mut TwoFactorConfig, code: &str) -> bool {
    let candidate = hash_backup_code(&config.code_salt, code);
    let candidate_bytes = candidate.as_bytes();

    let mut matched = None;
    for (i, stored) in config.backup_codes.iter().enumerate() {
        let equal: bool = stored.as_bytes().ct_eq(candidate_bytes).into();
        if equal && matched.is_none() {
            matched = Some(i);
        }
    }
    match matched {
        Some(i) => {
            config.backup_codes.remove(i);
            true
        }
        None => false,
    }
}
