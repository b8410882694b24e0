use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::OffsetDateTime;
use tracing::debug;

use super::claims::TokenClaims;
use crate::error::TokenError;
use crate::users::Role;

/// Signs and verifies HS256 bearer tokens with a secret fixed at construction.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], default_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn issue(&self, subject_id: i64, role: Role, ttl: Duration) -> Result<String, TokenError> {
        let exp = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
            .ok_or_else(|| TokenError::Signing(format!("ttl of {:?} overflows expiry", ttl)))?;
        let claims = TokenClaims {
            user_id: subject_id.to_string(),
            role,
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = subject_id, %role, "jwt signed");
        Ok(token)
    }

    pub fn issue_default(&self, subject_id: i64, role: Role) -> Result<String, TokenError> {
        self.issue(subject_id, role, self.default_ttl)
    }

    /// Verifies the signature, then rejects `exp <= now` with no leeway.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below so that `exp == now` counts as expired.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<TokenClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(TokenError::Expired);
        }
        data.claims.subject_id()?;
        debug!(user_id = %data.claims.user_id, role = %data.claims.role, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret.as_bytes(), Duration::from_secs(300))
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let issuer = make_issuer("dev-secret");
        let token = issuer.issue_default(42, Role::Admin).expect("issue");
        let claims = issuer.verify(&token).expect("verify");
        assert_eq!(claims.user_id, "42");
        assert_eq!(claims.subject_id().unwrap(), 42);
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp > OffsetDateTime::now_utc().unix_timestamp());
    }

    #[test]
    fn zero_ttl_is_expired_immediately() {
        let issuer = make_issuer("dev-secret");
        let token = issuer.issue(1, Role::User, Duration::ZERO).expect("issue");
        assert_eq!(issuer.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn out_of_range_ttl_is_a_signing_error() {
        let issuer = make_issuer("dev-secret");
        let err = issuer
            .issue(1, Role::User, Duration::from_secs(u64::MAX))
            .unwrap_err();
        assert!(matches!(err, TokenError::Signing(_)));

        // Representable as a duration but past the last valid date.
        let err = issuer
            .issue(1, Role::User, Duration::from_secs(60_000_000_000_000))
            .unwrap_err();
        assert!(matches!(err, TokenError::Signing(_)));
    }

    #[test]
    fn wrong_secret_is_bad_signature() {
        let token = make_issuer("secret-a").issue_default(1, Role::User).unwrap();
        let err = make_issuer("secret-b").verify(&token).unwrap_err();
        assert_eq!(err, TokenError::BadSignature);
    }

    #[test]
    fn expired_token_with_bad_signature_is_not_trusted() {
        let token = make_issuer("secret-a")
            .issue(1, Role::User, Duration::ZERO)
            .unwrap();
        let err = make_issuer("secret-b").verify(&token).unwrap_err();
        assert_eq!(err, TokenError::BadSignature);
    }

    #[test]
    fn tampered_payload_is_bad_signature() {
        let issuer = make_issuer("dev-secret");
        let token = issuer.issue_default(1, Role::User).unwrap();
        let forged = issuer.issue_default(1, Role::Admin).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);
        assert_eq!(issuer.verify(&spliced).unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let issuer = make_issuer("dev-secret");
        assert_eq!(issuer.verify("not-a-jwt").unwrap_err(), TokenError::Malformed);
        assert_eq!(issuer.verify("").unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn wire_payload_carries_string_user_id() {
        let issuer = make_issuer("dev-secret");
        let token = issuer.issue_default(9, Role::User).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        let raw = decode::<serde_json::Value>(&token, &DecodingKey::from_secret(&[]), &validation)
            .expect("decode payload");
        assert_eq!(raw.header.alg, Algorithm::HS256);
        assert_eq!(raw.claims["user_id"], "9");
        assert_eq!(raw.claims["role"], "user");
        assert!(raw.claims["exp"].is_i64());
    }
}
