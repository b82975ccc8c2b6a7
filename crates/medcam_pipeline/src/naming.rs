//! Output file naming.
//!
//! Heatmaps are written as `heatmap_{diagnosis_id}_{label}.{ext}`, with the
//! label lower-cased and spaces and path separators replaced by `_`. Names
//! are a pure function of the diagnosis and its label list, so retrying a
//! diagnosis overwrites its previous files.

use std::collections::HashSet;

use medcam_render::OutputFormat;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Lower-case `label` and replace whitespace and path separators with `_`.
pub fn normalize_label(label: &str) -> String {
    let normalized: String = label
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            ' ' | '\t' | '\n' | '\r' | '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();

    match normalized.as_str() {
        "" | "." | ".." => "unlabeled".to_string(),
        _ => normalized,
    }
}

/// 64-bit FNV-1a hash.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// First eight hex digits of the label's FNV-1a hash.
pub fn label_suffix(label: &str) -> String {
    format!("{:08x}", fnv1a64(label.as_bytes()) >> 32)
}

/// `heatmap_{diagnosis_id}_{normalized label}.{ext}`
pub fn heatmap_file_name(diagnosis_id: u64, label: &str, format: OutputFormat) -> String {
    format!(
        "heatmap_{diagnosis_id}_{}.{}",
        normalize_label(label),
        format.extension()
    )
}

/// Assigns collision-free file names to the labels of one diagnosis.
///
/// The first label with a given normalized stem gets the plain name; later
/// labels with the same stem get the hash suffix of their raw label.
#[derive(Debug)]
pub struct OutputNamer {
    diagnosis_id: u64,
    format: OutputFormat,
    used: HashSet<String>,
}

impl OutputNamer {
    /// Namer for one diagnosis.
    pub fn new(diagnosis_id: u64, format: OutputFormat) -> Self {
        Self {
            diagnosis_id,
            format,
            used: HashSet::new(),
        }
    }

    /// File name for the next label.
    pub fn assign(&mut self, label: &str) -> String {
        let stem = format!("heatmap_{}_{}", self.diagnosis_id, normalize_label(label));

        let mut candidate = stem.clone();
        if self.used.contains(&candidate) {
            let suffixed = format!("{stem}_{}", label_suffix(label));
            candidate = suffixed.clone();
            let mut n = 2;
            while self.used.contains(&candidate) {
                candidate = format!("{suffixed}_{n}");
                n += 1;
            }
        }

        self.used.insert(candidate.clone());
        format!("{candidate}.{}", self.format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Pleural Effusion"), "pleural_effusion");
        assert_eq!(normalize_label("COVID-19"), "covid-19");
        assert_eq!(normalize_label("a/b\\c"), "a_b_c");
        assert_eq!(normalize_label(""), "unlabeled");
        assert_eq!(normalize_label(".."), "unlabeled");
    }

    #[test]
    fn test_file_names_are_distinct_across_diagnoses() {
        let a = heatmap_file_name(42, "Pleural Effusion", OutputFormat::Png);
        let b = heatmap_file_name(7, "pleural_effusion", OutputFormat::Png);
        assert_eq!(a, "heatmap_42_pleural_effusion.png");
        assert_eq!(b, "heatmap_7_pleural_effusion.png");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fnv1a64_reference_values() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(label_suffix("a"), "af63dc4c");
    }

    #[test]
    fn test_namer_resolves_collisions() {
        let mut namer = OutputNamer::new(42, OutputFormat::Png);
        let first = namer.assign("Pleural Effusion");
        let second = namer.assign("pleural_effusion");
        let third = namer.assign("Pneumonia");

        assert_eq!(first, "heatmap_42_pleural_effusion.png");
        assert_eq!(
            second,
            format!("heatmap_42_pleural_effusion_{}.png", label_suffix("pleural_effusion"))
        );
        assert_eq!(third, "heatmap_42_pneumonia.png");
    }

    #[test]
    fn test_namer_is_deterministic() {
        let labels = ["Mass", "mass", "MASS", "mass"];
        let run = || {
            let mut namer = OutputNamer::new(1, OutputFormat::Jpeg);
            labels.iter().map(|l| namer.assign(l)).collect::<Vec<_>>()
        };

        let a = run();
        let b = run();
        assert_eq!(a, b);

        let unique: HashSet<_> = a.iter().collect();
        assert_eq!(unique.len(), labels.len());
        assert!(a.iter().all(|n| n.ends_with(".jpg")));
    }
}
