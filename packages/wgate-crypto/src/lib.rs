pub(crate) mod error;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use x25519_dalek::{PublicKey, StaticSecret};

pub use crate::error::CryptoError;

pub type CryptoResult<T> = core::result::Result<T, CryptoError>;

pub const KEY_LEN: usize = 32;

/// A fixed-length WireGuard key (public or preshared).
///
/// Textual form is 64 lowercase hex characters; the `wg` tool speaks base64.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s.trim())?;
        Self::try_from(bytes.as_slice())
    }

    pub fn to_base64(&self) -> String {
        base64::encode(self.0)
    }

    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let bytes = base64::decode(s.trim())?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = CryptoError;
    fn try_from(b: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_LEN] =
            b.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: KEY_LEN,
                actual: b.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; KEY_LEN]> for Key {
    fn from(b: [u8; KEY_LEN]) -> Self {
        Self(b)
    }
}

impl FromStr for Key {
    type Err = CryptoError;
    fn from_str(s: &str) -> CryptoResult<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({})", self.to_hex())
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyVisitor;

        impl<'de> de::Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 64 character hex encoded key as a quoted string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Key, E>
            where
                E: de::Error,
            {
                Key::from_hex(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// The gateway's private key. `Debug` never prints the material.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(Key);

impl PrivateKey {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        Self(Key::new(secret.to_bytes()))
    }

    pub fn public_key(&self) -> Key {
        let secret = StaticSecret::from(*self.0.as_bytes());
        Key::new(PublicKey::from(&secret).to_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_key(&self) -> &Key {
        &self.0
    }
}

impl From<Key> for PrivateKey {
    fn from(k: Key) -> Self {
        Self(k)
    }
}

impl FromStr for PrivateKey {
    type Err = CryptoError;
    fn from_str(s: &str) -> CryptoResult<Self> {
        Ok(Self(Key::from_hex(s)?))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_zero() {
            write!(f, "PrivateKey(<unset>)")
        } else {
            write!(f, "PrivateKey(<redacted>)")
        }
    }
}

pub struct KeyPair {
    pubkey: Key,
    privkey: PrivateKey,
}

impl KeyPair {
    pub fn pubkey(&self) -> &Key {
        &self.pubkey
    }

    pub fn privkey(&self) -> &PrivateKey {
        &self.privkey
    }
}

pub fn gen_keypair() -> KeyPair {
    let privkey = PrivateKey::generate();
    KeyPair {
        pubkey: privkey.public_key(),
        privkey,
    }
}
