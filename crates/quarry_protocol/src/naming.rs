//! Deterministic session naming.
//!
//! The remote system keys everything by session name, so the name must be
//! a pure function of `(prefix, job_id)` and two distinct job ids must
//! never collide under the same prefix. A readable slug of the query file
//! stem keeps names greppable; a short blake3 digest of the full job id
//! makes them collision-resistant even when stems repeat across packs.

const SLUG_MAX_LEN: usize = 48;
const DIGEST_LEN: usize = 8;

/// Derive the remote session name for a job.
pub fn session_name(prefix: &str, job_id: &str) -> String {
    let digest = blake3::hash(job_id.as_bytes()).to_hex();
    format!(
        "{}-{}-{}",
        prefix,
        slug(job_stem(job_id)),
        &digest.as_str()[..DIGEST_LEN]
    )
}

/// Final path component of the job id, without its extension.
fn job_stem(job_id: &str) -> &str {
    let name = job_id
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(job_id);
    match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn slug(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len().min(SLUG_MAX_LEN));
    let mut last_was_dash = false;
    for ch in stem.chars() {
        if out.len() >= SLUG_MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "query".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn session_name_is_pure() {
        let a = session_name("t1-misra-cpp", "cpp/misra/src/rules/RULE-1-1/UseOfBasicTypes.ql");
        let b = session_name("t1-misra-cpp", "cpp/misra/src/rules/RULE-1-1/UseOfBasicTypes.ql");
        assert_eq!(a, b);
    }

    #[test]
    fn session_name_keeps_prefix_and_stem() {
        let name = session_name("t1-misra-cpp", "cpp/misra/src/rules/RULE-1-1/UseOfBasicTypes.ql");
        assert!(name.starts_with("t1-misra-cpp-useofbasictypes-"));
    }

    #[test]
    fn same_stem_different_paths_do_not_collide() {
        let a = session_name("t1", "cpp/misra/src/Check.ql");
        let b = session_name("t1", "c/misra/src/Check.ql");
        assert_ne!(a, b);
    }

    #[test]
    fn unfriendly_characters_are_slugged() {
        let name = session_name("t1", "rules/Ünsafe Cast!!.ql");
        let slug_part = name.strip_prefix("t1-").unwrap();
        let (slug_part, digest) = slug_part.rsplit_once('-').unwrap();
        assert_eq!(digest.len(), 8);
        assert!(slug_part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn empty_stem_falls_back() {
        let name = session_name("t1", "...");
        assert!(name.starts_with("t1-query-"));
    }

    // Exhaustive collision check over a small bounded alphabet: every
    // distinct job id must get a distinct session name.
    #[test]
    fn bounded_alphabet_uniqueness() {
        let alphabet = ['a', 'b', '.', '/'];
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut ids = vec![String::new()];
        for _ in 0..3 {
            let mut next = Vec::new();
            for id in &ids {
                for ch in alphabet {
                    let mut longer = id.clone();
                    longer.push(ch);
                    next.push(longer);
                }
            }
            ids.extend(next.clone());
        }
        for id in ids.iter().filter(|id| !id.is_empty()) {
            let name = session_name("t1", id);
            if let Some(previous) = seen.insert(name.clone(), id.clone()) {
                assert_eq!(&previous, id, "collision: {:?} vs {:?} -> {}", previous, id, name);
            }
        }
    }
}
