/// Up to 20 characters of `source` starting at byte `position`, the context
/// quoted by syntax errors.
pub fn excerpt(source: &str, position: usize) -> String {
    source.get(position..).unwrap_or_default().chars().take(20).collect()
}
