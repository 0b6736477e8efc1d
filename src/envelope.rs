use serde::{Deserialize, Serialize};

/// Outcome code carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum Status {
    Ok,
    DownloadError,
    FileTypeError,
    StorageError,
    ParseError,
    DtypeError,
    SizeError,
    PreprocessError,
    InferenceError,
    EngineError,
    ContentError,
    ParameterError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 0,
            Status::DownloadError => 1001,
            Status::FileTypeError => 1002,
            Status::StorageError => 1003,
            Status::ParseError => 1102,
            Status::DtypeError => 1103,
            Status::SizeError => 1104,
            Status::PreprocessError => 1105,
            Status::InferenceError => 1106,
            Status::EngineError => 1107,
            Status::ContentError => 1201,
            Status::ParameterError => 1202,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

/// One ranked prediction: species, genus or family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub chinese_name: String,
    pub latin_name: String,
    pub probability: f32,
}

/// The response envelope shared by the HTML and JSON routes.
///
/// Built through [`IdentificationResult::success`] or
/// [`IdentificationResult::failure`] so the result lists can only be
/// non-empty when the status is [`Status::Ok`].
#[derive(Debug, Clone, Serialize)]
pub struct IdentificationResult {
    status: Status,
    message: String,
    results: Vec<RankedEntry>,
    family_results: Vec<RankedEntry>,
    genus_results: Vec<RankedEntry>,
}

impl IdentificationResult {
    pub fn success(
        results: Vec<RankedEntry>,
        family_results: Vec<RankedEntry>,
        genus_results: Vec<RankedEntry>,
    ) -> Self {
        Self {
            status: Status::Ok,
            message: "OK".to_string(),
            results,
            family_results,
            genus_results,
        }
    }

    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        debug_assert!(!status.is_ok(), "failure envelope with success status");
        Self {
            status,
            message: message.into(),
            results: Vec::new(),
            family_results: Vec::new(),
            genus_results: Vec::new(),
        }
    }

    pub fn parameter_error() -> Self {
        Self::failure(Status::ParameterError, "Parameter Error")
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn results(&self) -> &[RankedEntry] {
        &self.results
    }

    pub fn family_results(&self) -> &[RankedEntry] {
        &self.family_results
    }

    pub fn genus_results(&self) -> &[RankedEntry] {
        &self.genus_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_number() {
        let env = IdentificationResult::failure(Status::SizeError, "too small");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], 1104);
        assert_eq!(value["message"], "too small");
        assert_eq!(value["results"].as_array().unwrap().len(), 0);
        assert_eq!(value["family_results"].as_array().unwrap().len(), 0);
        assert_eq!(value["genus_results"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn success_keeps_lists_in_order() {
        let entry = |name: &str, p: f32| RankedEntry {
            chinese_name: name.to_string(),
            latin_name: format!("{name} latin"),
            probability: p,
        };
        let env = IdentificationResult::success(
            vec![entry("a", 0.7), entry("b", 0.2)],
            vec![entry("f", 0.9)],
            vec![],
        );
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], 0);
        assert_eq!(value["message"], "OK");
        assert_eq!(value["results"][0]["chinese_name"], "a");
        assert_eq!(value["results"][1]["latin_name"], "b latin");
        assert_eq!(env.family_results().len(), 1);
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            Status::Ok,
            Status::DownloadError,
            Status::FileTypeError,
            Status::StorageError,
            Status::ParseError,
            Status::DtypeError,
            Status::SizeError,
            Status::PreprocessError,
            Status::InferenceError,
            Status::EngineError,
            Status::ContentError,
            Status::ParameterError,
        ];
        let mut codes: Vec<u16> = all.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
