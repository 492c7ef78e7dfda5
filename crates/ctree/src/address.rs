//! Ledger account addresses in `<workchain>:<hex>` form

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Hash32, TreeError};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Address {
    pub workchain: i8,
    pub account: Hash32,
}

impl Address {
    pub const BASECHAIN: i8 = 0;
    pub const MASTERCHAIN: i8 = -1;

    pub fn new(workchain: i8, account: Hash32) -> crate::Result<Self> {
        if workchain != Self::BASECHAIN && workchain != Self::MASTERCHAIN {
            return Err(TreeError::InvalidAddress(format!(
                "unknown workchain value: {workchain}"
            )));
        }
        Ok(Self { workchain, account })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.account))
    }
}

impl FromStr for Address {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (wc, account) = s
            .split_once(':')
            .ok_or_else(|| TreeError::InvalidAddress(format!("missing workchain in {s:?}")))?;

        let workchain: i8 = wc
            .parse()
            .map_err(|_| TreeError::InvalidAddress(format!("bad workchain {wc:?}")))?;

        let bytes =
            hex::decode(account).map_err(|e| TreeError::InvalidAddress(e.to_string()))?;
        let account: Hash32 = bytes.as_slice().try_into().map_err(|_| {
            TreeError::InvalidAddress(format!(
                "incorrect address hash part length: {}",
                bytes.len()
            ))
        })?;

        Self::new(workchain, account)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let text = format!("-1:{}", "0f".repeat(32));
        let addr: Address = text.parse().unwrap();
        assert_eq!(addr.workchain, Address::MASTERCHAIN);
        assert_eq!(addr.account, [0x0f; 32]);
        assert_eq!(addr.to_string(), text);
    }

    #[test]
    fn rejects_unknown_workchain() {
        let text = format!("5:{}", "00".repeat(32));
        assert!(matches!(
            text.parse::<Address>(),
            Err(TreeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_short_account() {
        assert!("0:abcd".parse::<Address>().is_err());
        assert!("no-colon".parse::<Address>().is_err());
    }
}
