//! Just enough of the Solidity ABI to read the bridge's deposit events and the
//! handlers' deposit records.

use chainrelay_types::abi::WORD_SIZE;
use chainrelay_types::address::ADDRESS_SIZE;
use chainrelay_types::{Address, ResourceId, ZERO_ADDRESS};
use num_bigint::BigUint;
use sha3::{Digest, Keccak256};
use thiserror::Error;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// First four bytes of the keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_u64(value: u64) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn encode_u8(value: u8) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - 1] = value;
    word
}

/// Builds call data for a function whose arguments are all static words.
pub fn encode_call(signature: &str, words: &[[u8; WORD_SIZE]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + words.len() * WORD_SIZE);
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AbiError(pub String);

/// Reads head words of an ABI-encoded tuple. Offsets of dynamic members are
/// relative to the start of the tuple, which is `base`.
pub struct AbiReader<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> AbiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    pub fn word(&self, index: usize) -> Result<&'a [u8], AbiError> {
        let start = index
            .checked_mul(WORD_SIZE)
            .and_then(|o| o.checked_add(self.base))
            .ok_or_else(|| AbiError(format!("word {} out of range", index)))?;
        self.slice(start, WORD_SIZE)
    }

    pub fn uint(&self, index: usize) -> Result<BigUint, AbiError> {
        Ok(BigUint::from_bytes_be(self.word(index)?))
    }

    pub fn u64(&self, index: usize) -> Result<u64, AbiError> {
        let word = self.word(index)?;
        word_to_u64(word).ok_or_else(|| AbiError(format!("word {} does not fit in u64", index)))
    }

    pub fn u8(&self, index: usize) -> Result<u8, AbiError> {
        let value = self.u64(index)?;
        u8::try_from(value).map_err(|_| AbiError(format!("word {} does not fit in u8", index)))
    }

    pub fn address(&self, index: usize) -> Result<Address, AbiError> {
        let word = self.word(index)?;
        let start = WORD_SIZE - ADDRESS_SIZE;
        let mut address = ZERO_ADDRESS;
        address.copy_from_slice(&word[start..]);
        Ok(address)
    }

    pub fn resource_id(&self, index: usize) -> Result<ResourceId, AbiError> {
        ResourceId::try_from(self.word(index)?).map_err(|e| AbiError(e.to_string()))
    }

    /// Dynamic `bytes` member whose offset is stored in head word `index`.
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>, AbiError> {
        let start = self.offset(index)?;
        let len_word = self.slice(start, WORD_SIZE)?;
        let len = word_to_u64(len_word)
            .and_then(|l| usize::try_from(l).ok())
            .ok_or_else(|| AbiError("bytes length overflow".to_string()))?;
        Ok(self.slice(start + WORD_SIZE, len)?.to_vec())
    }

    /// Reader positioned at the tuple whose offset is stored in head word `index`.
    pub fn tuple(&self, index: usize) -> Result<AbiReader<'a>, AbiError> {
        Ok(AbiReader {
            data: self.data,
            base: self.offset(index)?,
        })
    }

    fn offset(&self, index: usize) -> Result<usize, AbiError> {
        let relative = self
            .u64(index)
            .ok()
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| AbiError(format!("invalid offset in word {}", index)))?;
        self.base
            .checked_add(relative)
            .ok_or_else(|| AbiError("offset overflow".to_string()))
    }

    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8], AbiError> {
        let end = start
            .checked_add(len)
            .ok_or_else(|| AbiError("length overflow".to_string()))?;
        self.data.get(start..end).ok_or_else(|| {
            AbiError(format!(
                "need bytes {}..{}, have {}",
                start,
                end,
                self.data.len()
            ))
        })
    }
}

/// Big-endian word to u64; `None` if any of the high 24 bytes is set.
pub fn word_to_u64(word: &[u8]) -> Option<u64> {
    if word.len() != WORD_SIZE || word[..WORD_SIZE - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD_SIZE - 8..]);
    Some(u64::from_be_bytes(buf))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Encoders used by tests to build realistic contract responses.

    use super::*;

    pub enum Token {
        Word([u8; WORD_SIZE]),
        Bytes(Vec<u8>),
    }

    pub fn uint_word(value: &BigUint) -> [u8; WORD_SIZE] {
        let bytes = value.to_bytes_be();
        let mut word = [0u8; WORD_SIZE];
        word[WORD_SIZE - bytes.len()..].copy_from_slice(&bytes);
        word
    }

    pub fn address_word(address: &Address) -> [u8; WORD_SIZE] {
        let mut word = [0u8; WORD_SIZE];
        word[WORD_SIZE - address.len()..].copy_from_slice(address);
        word
    }

    /// Encodes the members of a tuple (head followed by tail).
    pub fn encode_tuple(tokens: &[Token]) -> Vec<u8> {
        let mut head = Vec::new();
        let mut tail = Vec::new();
        let head_len = tokens.len() * WORD_SIZE;
        for token in tokens {
            match token {
                Token::Word(word) => head.extend_from_slice(word),
                Token::Bytes(bytes) => {
                    head.extend_from_slice(&encode_u64((head_len + tail.len()) as u64));
                    tail.extend_from_slice(&encode_u64(bytes.len() as u64));
                    tail.extend_from_slice(bytes);
                    let padding = (WORD_SIZE - bytes.len() % WORD_SIZE) % WORD_SIZE;
                    tail.extend(std::iter::repeat(0u8).take(padding));
                }
            }
        }
        head.extend(tail);
        head
    }

    /// Encodes a single dynamic tuple as a function return value.
    pub fn encode_struct_return(tokens: &[Token]) -> Vec<u8> {
        let mut out = encode_u64(WORD_SIZE as u64).to_vec();
        out.extend(encode_tuple(tokens));
        out
    }
}
