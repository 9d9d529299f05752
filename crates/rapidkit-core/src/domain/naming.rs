//! Identifier case conversions shared by the render context and the
//! template filters.

/// Split an identifier into lowercase words on `_`, `-`, `.`, whitespace and
/// lower→upper camel boundaries.
fn words(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in input.chars() {
        if c == '_' || c == '-' || c == '.' || c == '/' || c.is_whitespace() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        if c.is_uppercase()
            && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
            && !current.is_empty()
        {
            out.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn to_snake(input: &str) -> String {
    words(input).join("_")
}

pub fn to_kebab(input: &str) -> String {
    words(input).join("-")
}

pub fn to_pascal(input: &str) -> String {
    words(input)
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn to_camel(input: &str) -> String {
    let pascal = to_pascal(input);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(to_snake("dbPostgres"), "db_postgres");
        assert_eq!(to_kebab("db_postgres"), "db-postgres");
        assert_eq!(to_pascal("db_postgres"), "DbPostgres");
        assert_eq!(to_camel("rate-limiting"), "rateLimiting");
        assert_eq!(to_kebab("HTTPServer"), "httpserver");
    }

    #[test]
    fn empty_input() {
        assert_eq!(to_pascal(""), "");
        assert_eq!(to_camel("__"), "");
    }
}
