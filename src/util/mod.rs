pub mod env;

/// Truncate a response body for logging so failures stay readable.
pub fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        s.truncate(max_len);
        s.push_str("…");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_marks_cut_bodies() {
        assert_eq!(truncate_for_log("short".into(), 10), "short");
        let long = truncate_for_log("a".repeat(20), 10);
        assert!(long.starts_with("aaaaaaaaaa"));
        assert!(long.ends_with("…"));
    }
}
