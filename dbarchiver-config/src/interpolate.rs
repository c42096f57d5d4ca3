use std::env;

use regex::Regex;

/// Substitute `${VAR}` and `$VAR` occurrences in `raw` with the matching
/// process environment variable. Unknown variable names are left literal,
/// matching spec.md's "unknown variables are left literal" contract.
pub fn interpolate_env(raw: &str) -> String {
    // ${VAR} first, then bare $VAR (word boundary so we don't eat the `:`
    // that follows in a YAML value like `$HOST:3306`).
    let braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let bare = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();

    let after_braced = braced.replace_all(raw, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    let after_bare = bare.replace_all(&after_braced, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    after_bare.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_braced_and_bare_vars() {
        std::env::set_var("DBARCHIVER_TEST_HOST", "db.example.com");
        let input = "host: ${DBARCHIVER_TEST_HOST}\nuser: $DBARCHIVER_TEST_HOST";
        let out = interpolate_env(input);
        assert_eq!(out, "host: db.example.com\nuser: db.example.com");
        std::env::remove_var("DBARCHIVER_TEST_HOST");
    }

    #[test]
    fn leaves_unknown_vars_literal() {
        let input = "password: ${DBARCHIVER_DOES_NOT_EXIST_XYZ}";
        assert_eq!(interpolate_env(input), input);
    }
}
