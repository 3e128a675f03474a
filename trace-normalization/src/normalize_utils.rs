// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0. This product includes software
// developed at Datadog (https://www.datadoghq.com/). Copyright 2023-Present
// Datadog, Inc.

// MAX_NAME_LEN the maximum length a name can have
pub const MAX_NAME_LEN: usize = 100;
// MAX_SERVICE_LEN the maximum length a service can have
pub const MAX_SERVICE_LEN: usize = 100;
// MAX_TYPE_LEN the maximum length a span type can have
pub const MAX_TYPE_LEN: usize = 100;
// MAX_TAG_LEN the maximum length a tag can have
pub const MAX_TAG_LEN: usize = 200;

// NormalizeService validates a span service. Services longer than
// MAX_SERVICE_LEN or that normalize to an empty string are rejected, the
// service shall comply with tag normalization as it's eventually a tag.
pub fn normalize_service(svc: &str) -> anyhow::Result<String> {
    anyhow::ensure!(!svc.is_empty(), "Normalizer Error: Empty service name.");
    anyhow::ensure!(
        svc.len() <= MAX_SERVICE_LEN,
        "Normalizer Error: Service name longer than {MAX_SERVICE_LEN} characters."
    );

    let normalized = normalize_tag(svc)?;
    anyhow::ensure!(
        !normalized.is_empty(),
        "Normalizer Error: Service could not be normalized."
    );
    Ok(normalized)
}

// NormalizeTag applies some normalization to ensure the tags match the backend requirements.
pub fn normalize_tag(tag: &str) -> anyhow::Result<String> {
    // Fast path: Check if the tag is valid and only contains ASCII characters,
    // if yes return it as-is right away. For most use-cases this reduces CPU usage.
    if is_normalized_ascii_tag(tag) {
        return Ok(tag.to_string());
    }

    anyhow::ensure!(!tag.is_empty(), "Normalizer Error: Empty tag name.");

    let mut result = String::with_capacity(tag.len());

    // given a dummy value
    let mut last_char: char = 'a';

    for cur_char in tag.chars() {
        if result.len() >= MAX_TAG_LEN {
            break;
        }
        if cur_char.is_uppercase() {
            let mut lower = cur_char.to_lowercase();
            if lower.len() == 1 {
                let c = lower.next().unwrap();
                result.push(c);
                last_char = c;
            }
        } else if cur_char.is_alphabetic() || cur_char == ':' {
            result.push(cur_char);
            last_char = cur_char;
        } else if !result.is_empty()
            && (cur_char.is_ascii_digit() || matches!(cur_char, '.' | '/' | '-'))
        {
            result.push(cur_char);
            last_char = cur_char;
        } else if !result.is_empty() && last_char != '_' {
            result.push('_');
            last_char = '_';
        }
    }

    if last_char == '_' {
        result.pop();
    }

    Ok(result)
}

pub(crate) fn is_normalized_ascii_tag(tag: &str) -> bool {
    if tag.is_empty() {
        return true;
    }
    if tag.len() > MAX_TAG_LEN {
        return false;
    }
    let bytes = tag.as_bytes();
    if !is_valid_ascii_start_char(bytes[0] as char) {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        let c = b as char;
        if is_valid_ascii_tag_char(c) {
            continue;
        }
        if c == '_' {
            // an underscore is only okay if followed by a valid non-underscore character
            match bytes.get(i + 1) {
                Some(&next) if is_valid_ascii_tag_char(next as char) => continue,
                _ => return false,
            }
        }
        return false;
    }
    true
}

pub(crate) fn is_valid_ascii_start_char(c: char) -> bool {
    c.is_ascii_lowercase() || c == ':'
}

pub(crate) fn is_valid_ascii_tag_char(c: char) -> bool {
    is_valid_ascii_start_char(c) || c.is_ascii_digit() || matches!(c, '.' | '/' | '-')
}

// normalize_metric_name normalizes a span operation name with a parser
// instead of using garbage-creating string replacement routines, or an error
// describing why normalization failed.
pub fn normalize_metric_name(name: &str) -> anyhow::Result<String> {
    let chars: Vec<char> = name.chars().collect();

    // skip non-alphabetic characters
    let start = match chars.iter().position(|c| is_alpha(*c)) {
        Some(pos) => pos,
        // if there were no alphabetic characters it wasn't valid
        None => anyhow::bail!("Normalizer Error: Name contains no alphabetic chars."),
    };

    let mut result = String::with_capacity(name.len());

    // given a dummy value
    let mut last_char: char = 'a';

    for &cur_char in &chars[start..] {
        if is_alpha_num(cur_char) {
            result.push(cur_char);
            last_char = cur_char;
        } else if cur_char == '.' {
            // we skipped all non-alpha chars up front so we have seen at least one
            if last_char == '_' {
                // overwrite underscores that happen before periods
                result.pop();
            }
            result.push('.');
            last_char = '.';
        } else {
            // no double underscores, no underscores after periods
            if last_char != '.' && last_char != '_' {
                result.push('_');
                last_char = '_';
            }
        }
    }

    if last_char == '_' {
        result.pop();
    }
    Ok(result)
}

pub(crate) fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic()
}

pub(crate) fn is_alpha_num(c: char) -> bool {
    c.is_ascii_alphanumeric()
}
