//! Unifying tag for tensor-like foreign values.
//!
//! TensorFlow variables and tensors are unrelated Python classes. The class
//! filter prepends one shared tag whenever a value carries any of the known
//! tensor or variable tags, so callers can test a single capability.

use std::collections::BTreeSet;

/// Tag prepended to tensor-like values.
pub const TENSOR_TAG: &str = "tensorflow.tensor";

/// Foreign type tags treated as tensor-like.
pub const DEFAULT_TENSOR_CLASSES: &[&str] = &[
    "tensorflow.python.ops.variables.Variable",
    "tensorflow.python.ops.resource_variable_ops.ResourceVariable",
    "tensorflow.python.framework.ops.Tensor",
    "tensorflow.python.types.core.Tensor",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    tag: String,
    classes: BTreeSet<String>,
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::new(TENSOR_TAG, DEFAULT_TENSOR_CLASSES.iter().copied())
    }
}

impl ClassFilter {
    pub fn new<I, S>(tag: impl Into<String>, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag: tag.into(),
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    /// Whether any of `tags` is a known tensor-like class.
    pub fn is_tensor<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.classes.contains(t.as_ref()))
    }

    /// Prepend the unifying tag if `tags` names a tensor-like class and does
    /// not already carry it. Other tags are returned as given.
    pub fn apply<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        let mut out = Vec::with_capacity(tags.len() + 1);
        let tagged = tags.iter().any(|t| t.as_ref() == self.tag);
        if self.is_tensor(tags) && !tagged {
            out.push(self.tag.clone());
        }
        out.extend(tags.iter().map(|t| t.as_ref().to_string()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_gets_tag_prepended() {
        let filter = ClassFilter::default();
        let tags = ["tensorflow.python.framework.ops.Tensor", "builtins.object"];
        assert_eq!(
            filter.apply(&tags),
            vec![
                "tensorflow.tensor",
                "tensorflow.python.framework.ops.Tensor",
                "builtins.object"
            ]
        );
    }

    #[test]
    fn variable_gets_tag_prepended() {
        let filter = ClassFilter::default();
        let tags = [
            "tensorflow.python.ops.resource_variable_ops.ResourceVariable",
            "tensorflow.python.ops.variables.Variable",
        ];
        let out = filter.apply(&tags);
        assert_eq!(out[0], TENSOR_TAG);
        assert_eq!(&out[1..], &tags);
    }

    #[test]
    fn tag_is_added_once() {
        let filter = ClassFilter::default();
        let once = filter.apply(&["tensorflow.python.types.core.Tensor"]);
        let twice = filter.apply(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.iter().filter(|t| *t == TENSOR_TAG).count(), 1);
    }

    #[test]
    fn unrelated_tags_pass_through() {
        let filter = ClassFilter::default();
        let tags = ["numpy.ndarray", "builtins.object"];
        assert_eq!(filter.apply(&tags), tags);
        assert!(filter.apply::<&str>(&[]).is_empty());
    }

    #[test]
    fn custom_class_set() {
        let filter = ClassFilter::new("tf.any", ["keras.KerasTensor"]);
        assert_eq!(filter.apply(&["keras.KerasTensor"]), vec!["tf.any", "keras.KerasTensor"]);
        assert!(!filter.is_tensor(&["tensorflow.python.framework.ops.Tensor"]));
    }
}
