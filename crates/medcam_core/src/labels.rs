//! Class label lookup and target class selection.

use serde::{Deserialize, Serialize};

use crate::error::{CamError, Result};

/// Ordered class names of a classifier; position `i` names output `i`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    /// Create from an ordered list of names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no classes are named.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of class `index`.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// All names in output order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Resolve a label to its output index.
    ///
    /// Exact matches win; otherwise a case-insensitive match is accepted.
    /// Unknown labels are an error rather than a silent fallback to class 0.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidClassIndex`] when no class matches.
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == label)
            .or_else(|| self.names.iter().position(|n| n.eq_ignore_ascii_case(label)))
            .ok_or_else(|| CamError::InvalidClassIndex {
                target: label.to_string(),
                n_classes: self.names.len(),
            })
    }
}

/// Which output class a heatmap should explain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassTarget {
    /// The class with the highest predicted score.
    #[default]
    TopScore,
    /// An explicit output index.
    Index(usize),
    /// A class name resolved through the model's [`ClassLabels`].
    Label(String),
}

impl ClassTarget {
    /// Resolve to a concrete index given the model's labels and scores.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidClassIndex`] for an out-of-range index or unknown label.
    pub fn resolve(&self, labels: &ClassLabels, scores: &[f32]) -> Result<usize> {
        let n_classes = scores.len();
        let index = match self {
            Self::TopScore => argmax(scores).ok_or_else(|| CamError::invalid_index(0, 0))?,
            Self::Index(i) => *i,
            Self::Label(label) => labels.index_of(label)?,
        };

        if index >= n_classes {
            return Err(CamError::invalid_index(index, n_classes));
        }
        Ok(index)
    }
}

impl From<usize> for ClassTarget {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for ClassTarget {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

/// Index of the first maximum, ignoring NaN.
fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> ClassLabels {
        ClassLabels::new(["Normal", "Pneumonia", "Pleural Effusion"])
    }

    #[test]
    fn test_index_of() {
        let labels = labels();
        assert_eq!(labels.index_of("Pneumonia").unwrap(), 1);
        assert_eq!(labels.index_of("pleural effusion").unwrap(), 2);
        assert!(matches!(
            labels.index_of("Fracture"),
            Err(CamError::InvalidClassIndex { n_classes: 3, .. })
        ));
    }

    #[test]
    fn test_resolve_top_score() {
        let target = ClassTarget::TopScore;
        assert_eq!(target.resolve(&labels(), &[0.1, 0.7, 0.2]).unwrap(), 1);
        // Ties go to the first maximum.
        assert_eq!(target.resolve(&labels(), &[0.5, 0.5, 0.0]).unwrap(), 0);
        assert!(target.resolve(&labels(), &[]).is_err());
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        let err = ClassTarget::Index(3).resolve(&labels(), &[0.1, 0.2, 0.7]).unwrap_err();
        assert!(matches!(err, CamError::InvalidClassIndex { n_classes: 3, .. }));
    }

    #[test]
    fn test_resolve_label() {
        let target: ClassTarget = "Pleural Effusion".into();
        assert_eq!(target.resolve(&labels(), &[0.0, 0.0, 1.0]).unwrap(), 2);
    }
}
