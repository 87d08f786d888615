//! Column-name inflection: turn nested property paths into warehouse-safe
//! identifiers, abbreviating when a name would exceed the identifier limit.

use once_cell::sync::Lazy;
use regex::Regex;

/// Warehouse identifier length limit. Joined names are abbreviated until
/// they fall under it.
pub const MAX_IDENTIFIER_LEN: usize = 63;

// An underscore that already separates an acronym from the next word is
// widened so the boundary survives lowercasing ("HTTP_Status" keeps a
// visible seam as "http__status").
static ACRONYM_SEAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)_([A-Z][a-z])").unwrap());

static LOWER_UPPER_SEAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z\d])_([A-Z])").unwrap());

static ACRONYM_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());

static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z\d])([A-Z])").unwrap());

/// Normalize one path segment into a snake_case column identifier.
///
/// camelCase and acronym boundaries become underscores; hyphens become
/// underscores; the result is lowercased.
pub fn inflect_column_name(name: &str) -> String {
    let name = ACRONYM_SEAM.replace_all(name, "${1}__${2}");
    let name = LOWER_UPPER_SEAM.replace_all(&name, "${1}__${2}");
    let name = ACRONYM_BOUNDARY.replace_all(&name, "${1}_${2}");
    let name = CAMEL_BOUNDARY.replace_all(&name, "${1}_${2}");
    name.replace('-', "_").to_lowercase()
}

/// Build the flat column name for a nested property path.
///
/// Each segment is inflected and the segments are joined with `separator`.
/// While the joined name is at or over [`MAX_IDENTIFIER_LEN`], segments are
/// abbreviated left to right: the segment is camelized and stripped to its
/// acronym, falling back to the segment's first three characters when the
/// acronym degenerates to a single letter. Terminates once the name fits or
/// every segment has been abbreviated.
pub fn flatten_key(path: &[String], separator: &str) -> String {
    let mut segments: Vec<String> = path.iter().map(|s| inflect_column_name(s)).collect();

    let mut reducer_index = 0;
    while joined_len(&segments, separator) >= MAX_IDENTIFIER_LEN && reducer_index < segments.len()
    {
        let acronym = strip_lowercase(&camelize(&segments[reducer_index]));
        segments[reducer_index] = if acronym.chars().count() > 1 {
            acronym.to_lowercase()
        } else {
            segments[reducer_index].chars().take(3).collect()
        };
        reducer_index += 1;
    }

    segments.join(separator)
}

fn joined_len(segments: &[String], separator: &str) -> usize {
    let seg_len: usize = segments.iter().map(|s| s.chars().count()).sum();
    seg_len + separator.chars().count() * segments.len().saturating_sub(1)
}

/// snake_case to CamelCase.
fn camelize(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn strip_lowercase(name: &str) -> String {
    name.chars().filter(|c| !c.is_ascii_lowercase()).collect()
}
