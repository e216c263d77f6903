//! Three-part blob identifier: `content,part,position`.

use crate::error::BlobIdError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobId {
    pub content: String,
    pub part: String,
    pub position: u64,
}

impl BlobId {
    /// Canonical external form: `content,part,position`.
    pub fn encode(&self) -> String {
        let mut s = String::with_capacity(self.content.len() + self.part.len() + 12);
        s.push_str(&self.content);
        s.push(',');
        s.push_str(&self.part);
        s.push(',');
        s.push_str(&self.position.to_string());
        s
    }

    /// Decodes the canonical form. Fails if there are fewer than two
    /// commas, the position token is empty, or either hex field contains
    /// a non-hex digit. `content`/`part` may be empty; `position`
    /// defaults to 0 when the token is `"0"`.
    pub fn decode(s: &str) -> Result<BlobId, BlobIdError> {
        let first_comma = s.find(',').ok_or(BlobIdError::MissingSeparator)?;
        let rest = &s[first_comma + 1..];
        let second_comma = rest.find(',').ok_or(BlobIdError::MissingSeparator)?;

        let content = &s[..first_comma];
        let part = &rest[..second_comma];
        let position_token = &rest[second_comma + 1..];

        if position_token.is_empty() {
            return Err(BlobIdError::EmptyPosition);
        }
        if !is_hex(content) || !is_hex(part) {
            return Err(BlobIdError::NotHex);
        }

        let position: u64 = position_token.parse().map_err(|_| BlobIdError::NotHex)?;

        Ok(BlobId {
            content: content.to_string(),
            part: part.to_string(),
            position,
        })
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let id = BlobId { content: "deadbeef".into(), part: "01".into(), position: 0 };
        assert_eq!(BlobId::decode(&id.encode()).unwrap(), id);
    }

    #[test]
    fn round_trip_empty_fields() {
        let id = BlobId { content: String::new(), part: String::new(), position: 7 };
        assert_eq!(BlobId::decode(&id.encode()).unwrap(), id);
    }

    #[test]
    fn decode_rejects_missing_commas() {
        assert!(matches!(BlobId::decode("abc"), Err(BlobIdError::MissingSeparator)));
        assert!(matches!(BlobId::decode("abc,de"), Err(BlobIdError::MissingSeparator)));
    }

    #[test]
    fn decode_rejects_empty_position() {
        assert!(matches!(BlobId::decode("abc,de,"), Err(BlobIdError::EmptyPosition)));
    }

    #[test]
    fn decode_rejects_non_hex_position() {
        assert!(matches!(BlobId::decode("abc,de,x"), Err(BlobIdError::NotHex)));
    }

    #[test]
    fn decode_rejects_non_hex_part() {
        assert!(matches!(BlobId::decode("abc,xyz,0"), Err(BlobIdError::NotHex)));
    }

    #[test]
    fn decode_accepts_extra_commas_in_position_as_non_hex() {
        // A third comma lands inside the position token, which must be
        // purely decimal digits.
        assert!(BlobId::decode("ab,cd,0,0").is_err());
    }

    #[test]
    fn decode_defaults_position_zero() {
        let id = BlobId::decode("ff,00,0").unwrap();
        assert_eq!(id.position, 0);
    }
}
