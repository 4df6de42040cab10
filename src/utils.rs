// src/utils.rs
use crate::types::ScoutError;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use url::Url;

/// Reads root domains from a file, one per line. Blank lines and `#` comments are skipped.
pub fn read_domain_list(path: &Path) -> Result<Vec<String>, ScoutError> {
    let file = File::open(path)
        .map_err(|e| ScoutError::InputError(format!("Cannot open {}: {}", path.display(), e)))?;
    let domains = parse_domain_lines(BufReader::new(file))
        .map_err(|e| ScoutError::InputError(format!("Cannot read {}: {}", path.display(), e)))?;

    if domains.is_empty() {
        return Err(ScoutError::InputError(format!("{} contains no domains", path.display())));
    }
    Ok(domains)
}

pub fn parse_domain_lines<R: BufRead>(reader: R) -> std::io::Result<Vec<String>> {
    let mut domains = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        domains.push(line.to_string());
    }
    Ok(domains)
}

/// Extract domain from URL
pub fn extract_domain_from_url(url_str: &str) -> Result<String, ScoutError> {
    let url = Url::parse(url_str)
        .map_err(|e| ScoutError::InvalidDomain(format!("Invalid URL: {}", e)))?;

    url.host_str()
        .ok_or_else(|| ScoutError::InvalidDomain("No host in URL".to_string()))
        .map(|s| s.to_string())
}

/// Check if a string is a valid domain
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return false;
    }

    for part in parts {
        if part.is_empty() || part.len() > 63 {
            return false;
        }

        // underscores show up in real records (_dmarc, _domainkey)
        if !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return false;
        }

        if part.starts_with('-') || part.ends_with('-') {
            return false;
        }
    }

    true
}

/// True when `name` sits strictly below `root`.
pub fn is_subdomain_of(name: &str, root: &str) -> bool {
    name.len() > root.len() + 1
        && name.ends_with(root)
        && name.as_bytes()[name.len() - root.len() - 1] == b'.'
}

/// `*.example.com` is enumerated as `example.com`.
pub fn strip_wildcard_prefix(domain: &str) -> &str {
    match domain.rsplit_once("*.") {
        Some((_, rest)) => rest,
        None => domain,
    }
}

/// Extract subdomains from text using regex
pub fn extract_subdomains_from_text(text: &str, domain: &str) -> Result<Vec<String>, ScoutError> {
    let pattern = format!(
        r"(?i)(?:^|[^a-zA-Z0-9.-])([a-zA-Z0-9](?:[a-zA-Z0-9-]{{0,61}}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{{0,61}}[a-zA-Z0-9])?)*\.{})",
        regex::escape(domain)
    );

    let re = Regex::new(&pattern)
        .map_err(|e| ScoutError::ParseError(format!("Regex error: {}", e)))?;

    let mut subdomains = HashSet::new();

    for cap in re.captures_iter(text) {
        if let Some(subdomain) = cap.get(1) {
            let subdomain_str = subdomain.as_str().to_lowercase();
            if subdomain_str != domain && !subdomain_str.contains("..") {
                subdomains.insert(subdomain_str);
            }
        }
    }

    Ok(subdomains.into_iter().collect())
}
