use serde::{Deserialize, Serialize};

/// Number of raw fields a record source supplies per bet (the agency comes
/// from the session, not from the source).
pub const BET_SOURCE_FIELDS: usize = 5;

/// # Bet Record
///
/// One lottery bet. All fields are opaque strings at this layer: no numeric or
/// date validation happens before the aggregator sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    /// Submitting agency.
    pub agency: String,
    pub first_name: String,
    pub last_name: String,
    /// Participant document number.
    pub document: String,
    /// Birthdate, `YYYY-MM-DD`.
    pub birthdate: String,
    /// The number being bet on.
    pub number: String,
}

impl BetRecord {
    pub fn new(
        agency: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: impl Into<String>,
        birthdate: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            agency: agency.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birthdate: birthdate.into(),
            number: number.into(),
        }
    }

    /// Builds a record from the raw tuple of a record source.
    ///
    /// Returns `None` when the tuple does not have exactly
    /// `first, last, document, birthdate, number`.
    pub fn from_fields(agency: &str, fields: &[String]) -> Option<Self> {
        match fields {
            [first, last, document, birthdate, number] => Some(Self::new(
                agency,
                first.as_str(),
                last.as_str(),
                document.as_str(),
                birthdate.as_str(),
                number.as_str(),
            )),
            _ => None,
        }
    }

    /// The six fields in wire order.
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.agency,
            &self.first_name,
            &self.last_name,
            &self.document,
            &self.birthdate,
            &self.number,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields_requires_exact_arity() {
        let ok: Vec<String> = ["Ana", "Diaz", "30904465", "1999-03-17", "7574"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let bet = BetRecord::from_fields("1", &ok).unwrap();
        assert_eq!(bet.agency, "1");
        assert_eq!(bet.number, "7574");

        assert!(BetRecord::from_fields("1", &ok[..4]).is_none());
        let mut long = ok.clone();
        long.push("extra".to_string());
        assert!(BetRecord::from_fields("1", &long).is_none());
    }

    #[test]
    fn test_fields_are_in_wire_order() {
        let bet = BetRecord::new("2", "Juan", "Perez", "123", "2000-01-01", "42");
        assert_eq!(bet.fields(), ["2", "Juan", "Perez", "123", "2000-01-01", "42"]);
    }
}
