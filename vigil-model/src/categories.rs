use serde::{Deserialize, Serialize};

/// A server-defined classification category.
///
/// `keywords` match against file names and decoded file content;
/// `file_patterns` are regular expressions matched against the full path.
/// Both arrays are optional on the wire and default to empty. Categories are
/// read-only to the agent and evaluated in the order the server returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default = "default_color", alias = "Color")]
    pub color: String,
    #[serde(default, alias = "Keywords")]
    pub keywords: Vec<String>,
    #[serde(default, alias = "FilePatterns")]
    pub file_patterns: Vec<String>,
}

fn default_color() -> String {
    "#007bff".to_string()
}
