//! File naming for episode documents.
//!
//! Names must be stable across runs: the Fingerprint Store is keyed by the
//! path produced here, so a change in the rules would orphan every stored
//! hash.

use tracing::{debug, warn};

use crate::types::{BundleMetadata, EpisodeData};

pub const DEFAULT_EPISODE_FILE_NAME_TEMPLATE: &str = "{{episode_title}}";
pub const UNKNOWN_SHOW: &str = "Unknown Show";
pub const MAX_FILE_NAME_LEN: usize = 150;

const UNTITLED: &str = "untitled";

/// Characters the note vault refuses in links or names.
const VAULT_ILLEGAL: &[char] = &['[', ']', '#', '^', '|', ':', '\\', '/'];

/// Union of the Windows, macOS and Linux reserved characters.
const PLATFORM_ILLEGAL: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\0'];

fn is_illegal(c: char) -> bool {
    VAULT_ILLEGAL.contains(&c) || PLATFORM_ILLEGAL.contains(&c) || ('\u{1}'..='\u{1f}').contains(&c)
}

fn strip_trailing_dots_and_spaces(name: &str) -> &str {
    name.trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Replaces reserved characters with `_` and bounds the length.
///
/// Never returns an empty string.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_illegal(c) { '_' } else { c })
        .collect();

    let mut sanitized = strip_trailing_dots_and_spaces(replaced.trim()).to_string();

    if sanitized.chars().count() > MAX_FILE_NAME_LEN {
        let truncated: String = sanitized.chars().take(MAX_FILE_NAME_LEN).collect();
        sanitized = strip_trailing_dots_and_spaces(&truncated).to_string();
    }

    if sanitized.is_empty() {
        UNTITLED.to_string()
    } else {
        sanitized
    }
}

fn template_variable<'a>(episode: &'a EpisodeData, name: &str) -> Option<&'a str> {
    match name {
        "episode_title" => Some(&episode.episode_name),
        "episode_duration" => Some(&episode.episode_duration),
        "episode_publish_date" => Some(&episode.episode_publish_date),
        "episode_url" => Some(&episode.episode_url),
        _ => None,
    }
}

fn is_variable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expands `{{var}}` and `{{var}}[[label]]` placeholders. The label form
/// renders only the variable; the label exists for body templates.
fn render_template(template: &str, episode: &EpisodeData) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let name_len = after_open
            .find(|c: char| !is_variable_char(c))
            .unwrap_or(after_open.len());
        let name = &after_open[..name_len];

        if name.is_empty() || !after_open[name_len..].starts_with("}}") {
            out.push_str("{{");
            rest = after_open;
            continue;
        }

        match template_variable(episode, name) {
            Some(value) => out.push_str(value),
            None => warn!(variable = name, "Unknown variable in episode file name template"),
        }

        rest = &after_open[name_len + 2..];
        if let Some(label) = rest.strip_prefix("[[") {
            if let Some(close) = label.find("]]") {
                rest = &label[close + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// File name (without extension) for one episode document.
pub fn generate_episode_file_name(
    episode: Option<&EpisodeData>,
    episode_id: &str,
    template: Option<&str>,
) -> String {
    let Some(episode) = episode else {
        debug!(episode_id, "No episode data, naming file after the id");
        return sanitize_file_name(episode_id);
    };

    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_EPISODE_FILE_NAME_TEMPLATE);

    let mut name = render_template(template, episode);
    if name.trim().is_empty() {
        name = if episode.episode_name.is_empty() {
            episode_id.to_string()
        } else {
            episode.episode_name.clone()
        };
    }

    sanitize_file_name(&name)
}

/// Canonical form of a vault-relative path: forward slashes, no duplicate,
/// leading or trailing separators.
pub fn normalize_vault_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// True when `path` stays inside the directory it is joined onto: no `..`
/// segment, no leading separator and no drive prefix.
pub fn is_contained_vault_path(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let segments: Vec<&str> = path.split(['/', '\\']).collect();
    let drive = segments.first().is_some_and(|first| first.contains(':'));
    !drive && !segments.contains(&"..")
}

/// Vault-relative path of the document for `episode_id`:
/// `<target_dir>/<show>/<file name>.md`.
pub fn episode_target_path(
    target_dir: &str,
    metadata: &BundleMetadata,
    episode_id: &str,
    file_name_template: Option<&str>,
) -> String {
    let episode = metadata.episodes_data.get(episode_id);
    if episode.is_none() {
        warn!(episode_id, "No metadata found for episode");
    }

    let file_name = generate_episode_file_name(episode, episode_id, file_name_template);
    let show = metadata.show_name_for(episode).unwrap_or(UNKNOWN_SHOW);

    normalize_vault_path(&format!(
        "{}/{}/{}.md",
        target_dir,
        sanitize_file_name(show),
        file_name
    ))
}
