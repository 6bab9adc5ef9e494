use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_PREFIX: &str = "JOB-";
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_RANDOM_LEN: usize = 6;

/// Short human-readable job identifier of the form `JOB-XXXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id from uniformly random uppercase alphanumerics.
    ///
    /// Uniqueness is enforced by the store on insert, not here.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut id = String::with_capacity(ID_PREFIX.len() + ID_RANDOM_LEN);
        id.push_str(ID_PREFIX);
        for _ in 0..ID_RANDOM_LEN {
            let idx = rng.gen_range(0..ID_ALPHABET.len());
            id.push(ID_ALPHABET[idx] as char);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = s
            .strip_prefix(ID_PREFIX)
            .ok_or_else(|| format!("invalid job id: {}", s))?;
        if suffix.len() != ID_RANDOM_LEN
            || !suffix.bytes().all(|b| ID_ALPHABET.contains(&b))
        {
            return Err(format!("invalid job id: {}", s));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
