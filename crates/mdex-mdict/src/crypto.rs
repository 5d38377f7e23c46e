use byteorder::{ByteOrder, LittleEndian};
use ripemd::{Digest, Ripemd128};
use tracing::trace;

use crate::error::{MdictError, Result};
use crate::models::Encryption;

/// Registration code plus the user id (email) it was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passcode {
    pub regcode: Vec<u8>,
    pub user_id: String,
}

impl Passcode {
    /// Parse `regcode_hex,email`
    pub fn parse(raw: &str) -> Result<Self> {
        let (regcode, user_id) = raw
            .split_once(',')
            .ok_or_else(|| MdictError::InvalidPasscode("expected `regcode,email`".into()))?;
        Self::new(regcode.trim(), user_id.trim())
    }

    pub fn new(regcode_hex: &str, user_id: &str) -> Result<Self> {
        let regcode =
            hex::decode(regcode_hex).map_err(|e| MdictError::InvalidPasscode(e.to_string()))?;
        if regcode.len() != 16 {
            return Err(MdictError::InvalidPasscode(format!(
                "registration code must be 16 bytes, got {}",
                regcode.len()
            )));
        }
        Ok(Self {
            regcode,
            user_id: user_id.to_string(),
        })
    }

    /// Salsa20/8-decrypt the registration code with RIPEMD-128(user id)
    pub fn master_key(&self) -> [u8; 16] {
        let salsa_key = ripemd128(&[self.user_id.as_bytes()]);
        let mut key = [0u8; 16];
        key.copy_from_slice(&self.regcode);
        salsa_decrypt(&mut key, &salsa_key);
        key
    }
}

pub fn ripemd128(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Ripemd128::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Key for an encrypted v2 key index: RIPEMD-128(checksum bytes || 0x3695 LE)
pub fn key_index_key(checksum_bytes: &[u8]) -> [u8; 16] {
    ripemd128(&[checksum_bytes, &0x3695u32.to_le_bytes()])
}

pub fn decrypt_in_place(payload: &mut [u8], encryption: Encryption, key: &[u8; 16]) {
    match encryption {
        Encryption::None => {}
        Encryption::Fast => fast_decrypt(payload, key),
        Encryption::Salsa20 => salsa_decrypt(payload, key),
    }
}

pub fn fast_decrypt(data: &mut [u8], key: &[u8]) {
    trace!(len = data.len(), "fast decrypt");
    let mut previous = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let current = *byte;
        *byte = current.rotate_left(4) ^ previous ^ (i as u8) ^ key[i % key.len()];
        previous = current;
    }
}

/// Inverse of [`fast_decrypt`]
#[cfg(any(test, feature = "testing"))]
pub fn fast_encrypt(data: &mut [u8], key: &[u8]) {
    let mut previous = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let cipher = (*byte ^ previous ^ (i as u8) ^ key[i % key.len()]).rotate_right(4);
        *byte = cipher;
        previous = cipher;
    }
}

/// Salsa20 with 8 rounds, a 128-bit key and a zero nonce.
/// Being a stream cipher it both encrypts and decrypts.
pub fn salsa_decrypt(data: &mut [u8], key: &[u8; 16]) {
    trace!(len = data.len(), "salsa20/8 decrypt");
    // "expand 16-byte k"
    let mut state = [0u32; 16];
    state[0] = 0x6170_7865;
    state[5] = 0x3120_646e;
    state[10] = 0x7962_2d36;
    state[15] = 0x6b20_6574;
    for i in 0..4 {
        let word = LittleEndian::read_u32(&key[i * 4..]);
        state[1 + i] = word;
        state[11 + i] = word;
    }

    let mut keystream = [0u8; 64];
    for (counter, chunk) in data.chunks_mut(64).enumerate() {
        state[8] = counter as u32;
        state[9] = ((counter as u64) >> 32) as u32;

        let mut x = state;
        for _ in 0..4 {
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 5, 9, 13, 1);
            quarter_round(&mut x, 10, 14, 2, 6);
            quarter_round(&mut x, 15, 3, 7, 11);
            quarter_round(&mut x, 0, 1, 2, 3);
            quarter_round(&mut x, 5, 6, 7, 4);
            quarter_round(&mut x, 10, 11, 8, 9);
            quarter_round(&mut x, 15, 12, 13, 14);
        }
        for (i, word) in x.iter().enumerate() {
            LittleEndian::write_u32(&mut keystream[i * 4..], word.wrapping_add(state[i]));
        }
        for (byte, key_byte) in chunk.iter_mut().zip(keystream.iter()) {
            *byte ^= key_byte;
        }
    }
}

#[inline(always)]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}
