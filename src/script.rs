use crate::error::Error;
use std::{fs, path::Path};

pub(crate) const INTERACTION_ANCHOR: &str = "## Interaction ";

pub(crate) fn anchor_for(index: usize) -> String {
    format!("{}{}:", INTERACTION_ANCHOR, index)
}

/// A parsed script: one raw text block per interaction, split on the
/// `## Interaction <n>:` anchor lines. Read-only after construction, so it
/// can be shared freely across concurrent replays.
#[derive(Debug, Clone)]
pub struct ScriptDocument {
    filename: String,
    blocks: Vec<String>,
}

impl ScriptDocument {
    /// Load and parse a script file. An unreadable file is a script
    /// problem, reported as such rather than as a bare I/O error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let filename = path.as_ref().display().to_string();
        let text = fs::read_to_string(path.as_ref())
            .map_err(|_| Error::ScriptFormat(format!("Can't read contents of {}", filename)))?;
        Self::parse_with_filename(&text, filename)
    }

    /// Parse script text that did not come from a file.
    pub fn parse<T: AsRef<str>>(text: T) -> Result<Self, Error> {
        Self::parse_with_filename(text.as_ref(), String::from("n/a"))
    }

    fn parse_with_filename(text: &str, filename: String) -> Result<Self, Error> {
        let mut blocks: Vec<String> = Vec::new();
        let mut search_from = 0;
        loop {
            let anchor = anchor_for(blocks.len());
            let start = match text[search_from..].find(&anchor) {
                Some(offset) => search_from + offset,
                None => break,
            };
            match text[start..].find(&anchor_for(blocks.len() + 1)) {
                Some(offset) => {
                    blocks.push(text[start..start + offset].to_string());
                    search_from = start + offset;
                }
                None => {
                    blocks.push(text[start..].to_string());
                    break;
                }
            }
        }

        if blocks.is_empty() {
            return Err(Error::ScriptFormat(format!(
                "No '{}' found in script '{}'. Wrong/empty script file?",
                INTERACTION_ANCHOR.trim(),
                filename
            )));
        }

        Ok(ScriptDocument { filename, blocks })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn interaction_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> Option<&str> {
        self.blocks.get(index).map(String::as_str)
    }
}
