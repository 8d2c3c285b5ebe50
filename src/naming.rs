use std::collections::HashMap;

/// Build the environment variable name for a flag.
///
/// An explicit entry in `names` is returned verbatim. Otherwise the flag
/// name is upper-cased, `-` and `.` become `_`, and `prefix` is prepended.
pub fn env_name(flag: &str, prefix: &str, names: &HashMap<String, String>) -> String {
    if let Some(name) = names.get(flag) {
        return name.clone();
    }

    let mut name = String::with_capacity(prefix.len() + flag.len());
    name.push_str(prefix);
    for c in flag.to_uppercase().chars() {
        match c {
            '-' | '.' => name.push('_'),
            c => name.push(c),
        }
    }
    name
}
