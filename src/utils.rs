//! Small shared helpers

/// Join URL segments with single slashes, ignoring empty segments and
/// trimming stray slashes from each part.
pub fn url_join<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|part| part.as_ref().trim_matches('/').to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
