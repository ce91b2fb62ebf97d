use std::path::Path;

use tokio::fs;

/// One URL per line; surrounding whitespace is trimmed and blank lines dropped.
pub fn parse_link_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn read_link_file(path: &Path) -> std::io::Result<Vec<String>> {
    let text = fs::read_to_string(path).await?;
    Ok(parse_link_list(&text))
}
