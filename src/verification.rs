// Verification codes: short public identifiers printed on certificates so a
// third party can confirm authenticity without internal ids.

use rand::Rng;
use uuid::Uuid;

use crate::error::ApiError;

pub const CODE_LEN: usize = 10;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many random candidates the issuer tries before falling back to a
/// code derived from the certificate id.
pub const MAX_CODE_ATTEMPTS: u32 = 8;

pub fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Deterministic fallback once random sampling keeps colliding: fold the
/// whole 128-bit certificate id into base-36 digits so every byte of the
/// uuid influences the code. Ten digits cannot carry all 128 bits, so this
/// shortens rather than guarantees uniqueness; the database unique
/// constraint stays the final arbiter.
pub fn derived_code(certificate_id: Uuid) -> String {
    let mut n = u128::from_be_bytes(*certificate_id.as_bytes());
    let mut buf = [0u8; CODE_LEN];
    for slot in buf.iter_mut().rev() {
        *slot = ALPHABET[(n % ALPHABET.len() as u128) as usize];
        n /= ALPHABET.len() as u128;
    }
    buf.iter().map(|&b| b as char).collect()
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}

/// A verification request identifier: either an internal certificate id or
/// a public code. Malformed input is rejected before any lookup happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateRef {
    Id(Uuid),
    Code(String),
}

pub fn classify(
    certificate_id: Option<&str>,
    verification_code: Option<&str>,
) -> Result<CertificateRef, ApiError> {
    if let Some(raw) = certificate_id {
        let id = Uuid::parse_str(raw)
            .map_err(|_| ApiError::Validation("invalid certificate id format".into()))?;
        return Ok(CertificateRef::Id(id));
    }
    if let Some(code) = verification_code {
        if !is_well_formed(code) {
            return Err(ApiError::Validation(
                "invalid verification code format".into(),
            ));
        }
        return Ok(CertificateRef::Code(code.to_string()));
    }
    Err(ApiError::Validation(
        "certificate_id or verification_code required".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_are_well_formed() {
        for _ in 0..100 {
            let code = random_code();
            assert!(is_well_formed(&code), "bad code {code}");
        }
    }

    #[test]
    fn derived_code_is_deterministic_and_well_formed() {
        let id = Uuid::new_v4();
        let a = derived_code(id);
        let b = derived_code(id);
        assert_eq!(a, b);
        assert!(is_well_formed(&a));
    }

    #[test]
    fn distinct_ids_rarely_share_derived_codes() {
        let a = derived_code(Uuid::new_v4());
        let b = derived_code(Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn derived_code_sees_every_uuid_byte() {
        let base = [0u8; 16];
        // ids that agree on a long prefix must still derive apart
        let mut tail = base;
        tail[15] = 1;
        assert_ne!(
            derived_code(Uuid::from_bytes(base)),
            derived_code(Uuid::from_bytes(tail))
        );
        // and the leading byte matters too
        let mut head = base;
        head[0] = 1;
        assert_ne!(
            derived_code(Uuid::from_bytes(base)),
            derived_code(Uuid::from_bytes(head))
        );
    }

    #[test]
    fn malformed_id_is_rejected_without_lookup() {
        let err = classify(Some("not-a-uuid"), None).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn classify_prefers_id_then_code() {
        let id = Uuid::new_v4();
        let got = classify(Some(&id.to_string()), Some("ABCDE12345")).unwrap();
        assert_eq!(got, CertificateRef::Id(id));

        let got = classify(None, Some("ABCDE12345")).unwrap();
        assert_eq!(got, CertificateRef::Code("ABCDE12345".into()));
    }

    #[test]
    fn classify_rejects_bad_code_and_empty_request() {
        assert!(classify(None, Some("short")).is_err());
        assert!(classify(None, Some("abcde12345")).is_err()); // lowercase
        assert!(classify(None, None).is_err());
    }
}
