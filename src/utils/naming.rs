use chrono::Utc;
use rand::Rng;
use std::path::Path;

const MAX_NAME_BYTES: usize = 200;

/// Reduce a client-supplied filename to something safe to embed in a blob key.
///
/// Only the final path component is kept; control and reserved characters are
/// replaced with `_`. Returns `"unnamed"` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> String {
    // Normalize Windows separators so Path sees them as separators too
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == '/'
                || c == '\\'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > MAX_NAME_BYTES {
        let mut end = MAX_NAME_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    let trimmed = sanitized.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Blob key for a new upload: `<unix-millis>-<random>-<sanitized name>`.
pub fn generate_stored_name(original_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        suffix,
        sanitize_filename(original_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("résumé 2024.docx"), "résumé 2024.docx");
    }

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\photo.png"), "photo.png");
        assert_eq!(sanitize_filename("dir/"), "dir");
    }

    #[test]
    fn test_sanitize_replaces_reserved_chars() {
        assert_eq!(sanitize_filename("a:b*c?.txt"), "a_b_c_.txt");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_falls_back_when_empty() {
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename(".."), "unnamed");
        assert_eq!(sanitize_filename("   "), "unnamed");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let out = sanitize_filename(&long);
        assert!(out.len() <= MAX_NAME_BYTES);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_stored_names_are_unique_for_same_input() {
        let names: HashSet<String> = (0..200).map(|_| generate_stored_name("same.txt")).collect();
        assert_eq!(names.len(), 200);
        assert!(names.iter().all(|n| n.ends_with("-same.txt")));
    }

    #[test]
    fn test_stored_name_shape() {
        let name = generate_stored_name("notes.md");
        let mut parts = name.splitn(3, '-');
        assert!(parts.next().unwrap().parse::<i64>().is_ok());
        assert!(parts.next().unwrap().parse::<u32>().unwrap() < 1_000_000_000);
        assert_eq!(parts.next().unwrap(), "notes.md");
    }
}
