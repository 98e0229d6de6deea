//! Correlation token carried through the processor in the `custom` field.
//!
//! Format: `"<realm> <transaction id> <hex hmac-sha256(secret, "payid <id>")>"`.
//! The realm keeps several installations sharing one processor account apart.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

use crate::domain::foundation::{TransactionId, ValidationError};

use super::errors::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and checks correlation tokens.
#[derive(Clone)]
pub struct TokenCodec {
    realm: String,
    mac: HmacSha256,
}

impl TokenCodec {
    /// Creates a codec for `realm` keyed with `secret`.
    ///
    /// # Errors
    ///
    /// The realm must be non-empty and free of spaces since it is the first
    /// space separated field of the token.
    pub fn new(realm: impl Into<String>, secret: &SecretString) -> Result<Self, ValidationError> {
        let realm = realm.into();
        if realm.is_empty() {
            return Err(ValidationError::empty_field("realm"));
        }
        if realm.contains(' ') {
            return Err(ValidationError::invalid_format("realm", "must not contain spaces"));
        }
        let mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|e| ValidationError::invalid_format("secret_key", e.to_string()))?;
        Ok(Self { realm, mac })
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    fn signature(&self, id: TransactionId) -> String {
        let mut mac = self.mac.clone();
        mac.update(format!("payid {}", id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn encode(&self, id: TransactionId) -> String {
        format!("{} {} {}", self.realm, id, self.signature(id))
    }

    /// Recovers the transaction id from a token.
    ///
    /// # Errors
    ///
    /// `InvalidToken` unless the token has exactly three fields, the realm
    /// matches, the id is a canonical integer and the signature verifies.
    pub fn decode(&self, token: &str) -> Result<TransactionId, BillingError> {
        let mut fields = token.splitn(3, ' ');
        let (Some(realm), Some(raw_id), Some(signature)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(BillingError::InvalidToken);
        };
        if realm != self.realm {
            return Err(BillingError::InvalidToken);
        }

        let id: TransactionId = raw_id.parse().map_err(|_| BillingError::InvalidToken)?;
        if id.to_string() != raw_id {
            return Err(BillingError::InvalidToken);
        }

        let expected = self.signature(id);
        if expected.len() != signature.len() || !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(BillingError::InvalidToken);
        }
        Ok(id)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("realm", &self.realm)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("shop", &SecretString::new("s3cret".to_string())).unwrap()
    }

    #[test]
    fn encoded_token_has_three_fields() {
        let token = codec().encode(TransactionId::new(42));
        let fields: Vec<&str> = token.split(' ').collect();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], "shop");
        assert_eq!(fields[1], "42");
        assert_eq!(fields[2].len(), 64);
    }

    #[test]
    fn decode_accepts_own_token() {
        let codec = codec();
        let token = codec.encode(TransactionId::new(42));
        assert_eq!(codec.decode(&token).unwrap(), TransactionId::new(42));
    }

    #[test]
    fn decode_rejects_other_realm() {
        let token = codec().encode(TransactionId::new(42));
        let other = TokenCodec::new("other", &SecretString::new("s3cret".to_string())).unwrap();
        assert!(matches!(other.decode(&token), Err(BillingError::InvalidToken)));
    }

    #[test]
    fn decode_rejects_other_secret() {
        let token = codec().encode(TransactionId::new(42));
        let other = TokenCodec::new("shop", &SecretString::new("different".to_string())).unwrap();
        assert!(matches!(other.decode(&token), Err(BillingError::InvalidToken)));
    }

    #[test]
    fn decode_rejects_malformed_tokens() {
        let codec = codec();
        for token in ["", "shop", "shop 42", "shop abc deadbeef", "shop 42 zz"] {
            assert!(
                matches!(codec.decode(token), Err(BillingError::InvalidToken)),
                "accepted {:?}",
                token
            );
        }
    }

    #[test]
    fn decode_rejects_uppercase_signature() {
        let codec = codec();
        let token = codec.encode(TransactionId::new(7)).to_uppercase().replacen("SHOP", "shop", 1);
        assert!(codec.decode(&token).is_err());
    }

    #[test]
    fn realm_with_space_is_rejected() {
        let result = TokenCodec::new("my shop", &SecretString::new("k".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains("s3cret"));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(id in 0i64..i64::MAX) {
            let codec = codec();
            let token = codec.encode(TransactionId::new(id));
            prop_assert_eq!(codec.decode(&token).unwrap(), TransactionId::new(id));
        }

        #[test]
        fn single_character_mutation_is_rejected(
            id in 0i64..1_000_000,
            position in any::<prop::sample::Index>(),
            replacement in prop::char::range(' ', '~'),
        ) {
            let codec = codec();
            let token = codec.encode(TransactionId::new(id));
            let mut chars: Vec<char> = token.chars().collect();
            let index = position.index(chars.len());
            prop_assume!(chars[index] != replacement);
            chars[index] = replacement;
            let mutated: String = chars.into_iter().collect();

            prop_assert!(codec.decode(&mutated).is_err());
        }
    }
}
