//! Pathname expansion: `*`, `?` and `[...]` matched against directory entries.
//!
//! Patterns reach this module with quoting already resolved into backslash
//! escapes: `\*` matches a literal star. Names starting with `.` only match
//! a pattern component that itself starts with `.`.

use regex::Regex;
use std::fs;
use std::path::Path;

/// Whether `pattern` contains an unescaped `*`, `?` or `[`.
pub fn has_glob_chars(pattern: &str) -> bool {
    let mut escaped = false;
    for ch in pattern.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Remove the backslash escapes from `pattern`.
pub fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Expand `pattern` against the file system, relative paths being resolved
/// against `cwd`. Matches are returned sorted and spelled the way the
/// pattern spelled its directory part. No match yields an empty vector.
pub fn expand(pattern: &str, cwd: &Path) -> Vec<String> {
    let (prefix, rest) = match pattern.strip_prefix('/') {
        Some(rest) => ("/".to_string(), rest),
        None => (String::new(), pattern),
    };
    let components: Vec<&str> = rest.split('/').filter(|c| !c.is_empty()).collect();
    // `*/` only matches directories.
    let dirs_only = rest.ends_with('/');

    let mut matches = vec![prefix];
    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len() && !dirs_only;
        let mut next = Vec::new();
        for base in &matches {
            if has_glob_chars(component) {
                next.extend(match_component(base, component, cwd, last));
            } else {
                let candidate = join(base, &unescape(component));
                if last || resolve(&candidate, cwd).is_dir() {
                    next.push(candidate);
                }
            }
        }
        matches = next;
        if matches.is_empty() {
            break;
        }
    }

    // Patterns whose last component has no wildcard only confirm existence.
    matches.retain(|m| !m.is_empty() && resolve(m, cwd).symlink_metadata().is_ok());
    if dirs_only {
        for m in &mut matches {
            m.push('/');
        }
    }
    matches.sort();
    matches.dedup();
    matches
}

fn match_component(base: &str, component: &str, cwd: &Path, last: bool) -> Vec<String> {
    let Some(re) = component_regex(component) else {
        return Vec::new();
    };
    let dir = if base.is_empty() {
        cwd.to_path_buf()
    } else {
        resolve(base, cwd)
    };
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') && !component.starts_with('.') {
            continue;
        }
        if !re.is_match(&name) {
            continue;
        }
        let candidate = join(base, &name);
        if last || resolve(&candidate, cwd).is_dir() {
            found.push(candidate);
        }
    }
    found
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

fn resolve(path: &str, cwd: &Path) -> std::path::PathBuf {
    cwd.join(path)
}

/// Translate one pattern component into an anchored regular expression.
///
/// Returns `None` for a component the regex engine rejects.
pub fn component_regex(component: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let chars: Vec<char> = component.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                i += 1;
                re.push_str(&regex::escape(&chars[i].to_string()));
            }
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    re.push_str(&bracket_class(&chars[i + 1..end]));
                    i = end;
                }
                None => re.push_str(r"\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Index of the `]` closing the bracket expression opened at `start`.
fn bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        i += 1;
    }
    // A `]` right after the opening bracket is a member, not the end.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            ']' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn bracket_class(body: &[char]) -> String {
    let (negated, body) = match body.first() {
        Some('!') | Some('^') => (true, &body[1..]),
        _ => (false, body),
    };
    let mut class = String::from(if negated { "[^" } else { "[" });
    let mut chars = body.iter().copied();
    while let Some(c) = chars.next() {
        match c {
            // An escaped member stands for itself, never for the backslash.
            '\\' => match chars.next() {
                Some(escaped) => push_class_literal(&mut class, escaped),
                None => push_class_literal(&mut class, '\\'),
            },
            '-' => class.push('-'),
            c => push_class_literal(&mut class, c),
        }
    }
    class.push(']');
    class
}

fn push_class_literal(class: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~' | '-') {
        class.push('\\');
    }
    class.push(c);
}
