use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Output of `--dump-json`: one object per requested input.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoMetadata {
    Single(Value),
    Multiple(Vec<Value>)
}

impl VideoMetadata {
    /// Parses `--dump-json` output.
    ///
    /// yt-dlp prints one JSON document per line when given several inputs,
    /// which is not valid JSON as a whole. When the output does not parse as
    /// a single value the lines are joined into an array and parsed again.
    pub fn parse(stdout: &str) -> Result<Self> {
        if let Ok(value) = serde_json::from_str::<Value>(stdout) {
            return Ok(VideoMetadata::Single(value));
        }

        let joined = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        let items: Vec<Value> = serde_json::from_str(&format!("[{joined}]"))?;
        Ok(VideoMetadata::Multiple(items))
    }

    pub fn into_vec(self) -> Vec<Value> {
        match self {
            VideoMetadata::Single(value) => vec![value],
            VideoMetadata::Multiple(values) => values
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VideoMetadata::Single(_) => 1,
            VideoMetadata::Multiple(values) => values.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deserializes every item into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.into_vec()
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .collect()
    }
}
