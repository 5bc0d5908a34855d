//! On-demand documentation links for foreign symbols.

use crate::version::Version;

const DOCS_ROOT: &str = "https://www.tensorflow.org";

/// Maps a dotted TensorFlow symbol (`tf.nn.relu`, `tensorflow.nn.relu`) to
/// its API reference page.
///
/// 1.x releases are documented under a versioned path; 2.x and unknown
/// versions use the current docs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpHandler {
    version: Option<Version>,
}

impl HelpHandler {
    pub fn new(version: Option<Version>) -> Self {
        Self { version }
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Documentation URL for `topic`, or `None` when the topic is not a
    /// TensorFlow symbol.
    pub fn url(&self, topic: &str) -> Option<String> {
        let topic = topic.trim();
        let rest = ["tf", "tensorflow"].iter().find_map(|prefix| {
            if topic == *prefix {
                Some("")
            } else {
                let rest = topic.strip_prefix(prefix)?.strip_prefix('.')?;
                (!rest.is_empty()).then_some(rest)
            }
        })?;

        if rest.split('.').any(str::is_empty) && !rest.is_empty() {
            return None;
        }

        let mut path = String::from("tf");
        if !rest.is_empty() {
            path.push('/');
            path.push_str(&rest.replace('.', "/"));
        }

        Some(match self.version {
            Some(v) if v.major < 2 => {
                format!("{DOCS_ROOT}/versions/r{v}/api_docs/python/{path}")
            }
            _ => format!("{DOCS_ROOT}/api_docs/python/{path}"),
        })
    }
}
