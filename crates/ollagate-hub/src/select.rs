//! Quantization tags and artifact selection.

/// Quantization preference, highest quality first.
pub const QUANT_PREFERENCE: &[&str] = &[
    "F16", "Q8_0", "Q6_K", "Q5_K_M", "Q5_0", "Q4_K_M", "Q4_0", "Q3_K_M", "Q2_K",
];

/// Canonical tag form: uppercased, dashes folded to underscores.
pub fn normalize_quant(tag: &str) -> String {
    tag.to_uppercase().replace('-', "_")
}

/// Pick the artifact file to download for a target quantization.
///
/// Exact tag containment wins; otherwise the tiers above the target are
/// walked in preference order and the first file carrying one is taken;
/// otherwise the first file.
pub fn select_artifact<'a>(files: &'a [String], quant: &str) -> Option<&'a str> {
    if files.is_empty() {
        return None;
    }

    let target = normalize_quant(quant);
    if let Some(exact) = files.iter().find(|f| normalize_quant(f).contains(&target)) {
        return Some(exact);
    }

    // Only higher-quality tiers qualify as substitutes; lower ones fall
    // through to the positional default
    if let Some(target_idx) = QUANT_PREFERENCE.iter().position(|q| *q == target) {
        for candidate in &QUANT_PREFERENCE[..target_idx] {
            if let Some(file) = files.iter().find(|f| normalize_quant(f).contains(candidate)) {
                return Some(file);
            }
        }
    }

    files.first().map(String::as_str)
}
