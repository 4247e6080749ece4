//! C6 — TransformPipeline: the fixed, ordered per-file transform producing
//! the final `(front-matter, body)` bytes (spec §4.6).
//!
//! The six steps run in the declared order and that order is the contract —
//! `copy_content` must never reorder or skip a step for a markdown file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_yaml::Value;

use crate::config::SiteConfig;
use crate::editlink::EditLinkResolver;
use crate::frontmatter;
use crate::theme::Theme;
use crate::types::{DocFile, FrontMatterPatch, MergeMode, Page};

const BUILDER_PATCH_PRIORITY: i32 = 50;
const EDIT_LINK_PATCH_PRIORITY: i32 = 60;

pub struct TransformContext<'a> {
    pub now: DateTime<Utc>,
    pub resolver: &'a EditLinkResolver<'a>,
    pub theme: &'a dyn Theme,
    pub site: &'a SiteConfig,
}

/// Runs the full six-step pipeline over `file` and returns the finished
/// [`Page`], with `raw` populated and mirrored onto `file.transformed_bytes`.
pub fn transform_file(file: DocFile, ctx: &TransformContext<'_>) -> Page {
    let mut page = Page::new(file);

    front_matter_parser(&mut page);

    page.patches.push(front_matter_builder(&page, ctx.now));

    if let Some(patch) = edit_link_injector(&page, ctx) {
        page.patches.push(patch);
    }

    let (merged, conflicts) = frontmatter::merge(&page.original_front_matter, &page.patches);
    page.merged_front_matter = merged;
    page.conflicts = conflicts;

    relative_link_rewriter(&mut page);

    front_matter_serialize(&mut page);

    page.file.transformed_bytes = Some(page.raw.clone());
    page
}

/// Step 1: parses a leading `---` YAML block (LF or CRLF delimited) out of
/// `page.content`, or leaves `original_front_matter` empty on a malformed
/// block / absent front matter.
fn front_matter_parser(page: &mut Page) {
    let raw = String::from_utf8_lossy(&page.content).into_owned();
    let normalized = raw.replace("\r\n", "\n");

    let Some(rest) = normalized.strip_prefix("---\n") else { return };

    let (yaml_block, body) = if let Some(body) = rest.strip_prefix("---\n") {
        ("", body)
    } else if let Some(end_idx) = rest.find("\n---\n") {
        (&rest[..end_idx], &rest[end_idx + "\n---\n".len()..])
    } else {
        return;
    };

    match serde_yaml::from_str::<BTreeMap<String, Value>>(yaml_block) {
        Ok(map) => {
            page.original_front_matter = map;
            page.had_front_matter = true;
            page.content = body.as_bytes().to_vec();
        }
        Err(_) => {
            // Malformed YAML: leave `original_front_matter` empty and
            // `had_front_matter = false`, content untouched (spec §4.6 row 1).
        }
    }
}

fn title_case_from_filename(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Step 2: builds the Deep patch carrying computed defaults.
fn front_matter_builder(page: &Page, now: DateTime<Utc>) -> FrontMatterPatch {
    let mut patch = FrontMatterPatch::new("builder", MergeMode::Deep, BUILDER_PATCH_PRIORITY);

    if page.file.name.to_lowercase() != "index" {
        patch = patch.set("title", Value::String(title_case_from_filename(&page.file.name)));
    }
    patch = patch.set("date", Value::String(now.to_rfc3339()));
    patch = patch.set("repository", Value::String(page.file.repository.clone()));
    if let Some(forge) = &page.file.forge {
        patch = patch.set("forge", Value::String(forge.clone()));
    }
    if !page.file.section.is_empty() {
        patch = patch.set("section", Value::String(page.file.section.clone()));
    }
    for (key, value) in &page.file.metadata {
        if !page.original_front_matter.contains_key(key) {
            patch = patch.set(key.clone(), Value::String(value.clone()));
        }
    }
    patch = patch.set("type", Value::String("docs".to_string()));
    patch
}

/// Step 3: emits a SetIfMissing `editURL` patch, unless an `editURL` is
/// already present, or the resolver returns empty (including the site-level
/// `params.editURL.base` override, handled inside the resolver itself).
fn edit_link_injector(page: &Page, ctx: &TransformContext<'_>) -> Option<FrontMatterPatch> {
    let already_present = page.original_front_matter.contains_key("editURL")
        || page.patches.iter().any(|p| p.data.contains_key("editURL"));
    if already_present {
        return None;
    }

    let url = ctx.resolver.resolve(&page.file, ctx.theme, ctx.site);
    if url.is_empty() {
        return None;
    }

    Some(FrontMatterPatch::new("edit_link", MergeMode::SetIfMissing, EDIT_LINK_PATCH_PRIORITY).set("editURL", Value::String(url)))
}

/// Step 5: rewrites relative `.md`/`.markdown` links into Hugo's pretty-URL
/// form, leaving absolute URLs, mailto links, and pure anchors untouched.
fn relative_link_rewriter(page: &mut Page) {
    let is_index = matches!(page.file.name.to_lowercase().as_str(), "index" | "readme");
    let repo_prefix = match &page.file.forge {
        Some(forge) => format!("{forge}/{}", page.file.repository),
        None => page.file.repository.clone(),
    };

    let body = String::from_utf8_lossy(&page.content).into_owned();
    let rewritten = rewrite_markdown_links(&body, is_index, &repo_prefix);
    page.content = rewritten.into_bytes();
}

fn rewrite_markdown_links(body: &str, is_index: bool, repo_prefix: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut result = String::with_capacity(body.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '[' {
            if let Some(close_bracket) = find_char(&chars, i + 1, ']') {
                if chars.get(close_bracket + 1) == Some(&'(') {
                    if let Some(close_paren) = find_char(&chars, close_bracket + 2, ')') {
                        let text: String = chars[i + 1..close_bracket].iter().collect();
                        let link: String = chars[close_bracket + 2..close_paren].iter().collect();

                        let final_link = rewrite_link(&link, is_index, repo_prefix).unwrap_or(link);
                        result.push('[');
                        result.push_str(&text);
                        result.push_str("](");
                        result.push_str(&final_link);
                        result.push(')');

                        i = close_paren + 1;
                        continue;
                    }
                }
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}

fn find_char(chars: &[char], start: usize, target: char) -> Option<usize> {
    chars.get(start..).and_then(|slice| slice.iter().position(|&c| c == target)).map(|pos| pos + start)
}

fn rewrite_link(link: &str, is_index: bool, repo_prefix: &str) -> Option<String> {
    let (path_part, anchor) = match link.find('#') {
        Some(idx) => (&link[..idx], Some(&link[idx + 1..])),
        None => (link, None),
    };

    if path_part.is_empty() {
        return None;
    }
    if path_part.starts_with("http://") || path_part.starts_with("https://") || path_part.starts_with("mailto:") {
        return None;
    }

    let lower = path_part.to_lowercase();
    let ext_len = if lower.ends_with(".markdown") {
        ".markdown".len()
    } else if lower.ends_with(".md") {
        ".md".len()
    } else {
        return None;
    };
    let stripped = &path_part[..path_part.len() - ext_len];

    let mut rewritten = if let Some(rest) = stripped.strip_prefix('/') {
        format!("/{repo_prefix}/{rest}")
    } else {
        let rest = stripped.strip_prefix("./").unwrap_or(stripped);
        if is_index { rest.to_string() } else { format!("../{rest}") }
    };
    if !rewritten.ends_with('/') {
        rewritten.push('/');
    }
    if let Some(anchor) = anchor {
        rewritten.push('#');
        rewritten.push_str(anchor);
    }
    Some(rewritten)
}

/// Step 6: re-serializes `merged_front_matter` and the (possibly rewritten)
/// body into `page.raw`. Idempotent by construction: a second pass over this
/// output reparses the same front matter (reserved keys already present are
/// protected) and skips already-rewritten links (they no longer end in
/// `.md`).
fn front_matter_serialize(page: &mut Page) {
    let yaml_str = serde_yaml::to_string(&page.merged_front_matter).unwrap_or_default();
    let body = String::from_utf8_lossy(&page.content).into_owned();

    let mut raw = String::with_capacity(yaml_str.len() + body.len() + 8);
    raw.push_str("---\n");
    raw.push_str(&yaml_str);
    if !yaml_str.ends_with('\n') {
        raw.push('\n');
    }
    raw.push_str("---\n");
    raw.push_str(&body);

    page.raw = raw.into_bytes();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editlink::ForgesConfig;
    use crate::theme::DefaultTheme;
    use crate::types::Repository;

    fn file(repository: &str, name: &str, content: &str) -> DocFile {
        DocFile {
            repository: repository.to_string(),
            forge: None,
            name: name.to_string(),
            relative_path: format!("{name}.md"),
            docs_base: String::new(),
            extension: "md".to_string(),
            section: String::new(),
            metadata: BTreeMap::new(),
            content: content.as_bytes().to_vec(),
            is_asset: false,
            transformed_bytes: None,
        }
    }

    fn ctx<'a>(resolver: &'a EditLinkResolver<'a>, theme: &'a dyn Theme, site: &'a SiteConfig) -> TransformContext<'a> {
        TransformContext { now: "2026-01-01T00:00:00Z".parse().unwrap(), resolver, theme, site }
    }

    #[test]
    fn parses_front_matter_and_strips_it_from_content() {
        let mut page = Page::new(file("r", "page", "---\ntitle: Hi\n---\nbody text\n"));
        front_matter_parser(&mut page);
        assert!(page.had_front_matter);
        assert_eq!(page.original_front_matter.get("title"), Some(&Value::String("Hi".to_string())));
        assert_eq!(String::from_utf8_lossy(&page.content), "body text\n");
    }

    #[test]
    fn malformed_yaml_leaves_front_matter_empty() {
        let mut page = Page::new(file("r", "page", "---\n: : broken\n---\nbody\n"));
        front_matter_parser(&mut page);
        assert!(!page.had_front_matter);
        assert!(page.original_front_matter.is_empty());
    }

    #[test]
    fn no_front_matter_leaves_content_untouched() {
        let mut page = Page::new(file("r", "page", "just a body\n"));
        front_matter_parser(&mut page);
        assert!(!page.had_front_matter);
        assert_eq!(String::from_utf8_lossy(&page.content), "just a body\n");
    }

    #[test]
    fn title_case_conversion() {
        assert_eq!(title_case_from_filename("getting-started"), "Getting Started");
        assert_eq!(title_case_from_filename("quick_start"), "Quick Start");
    }

    #[test]
    fn index_pages_do_not_get_a_title() {
        let page = Page::new(file("r", "index", "body"));
        let patch = front_matter_builder(&page, "2026-01-01T00:00:00Z".parse().unwrap());
        assert!(!patch.data.contains_key("title"));
    }

    #[test]
    fn full_pipeline_scenario_six_non_index_page() {
        let repos = vec![Repository {
            name: "my-project".to_string(),
            clone_url: "https://github.com/acme/my-project.git".to_string(),
            branch: "main".to_string(),
            paths: Vec::new(),
            tags: BTreeMap::new(),
            forge: None,
        }];
        let forges = ForgesConfig::new();
        let resolver = EditLinkResolver::new(&repos, &forges);
        let theme = DefaultTheme::default();
        let site = SiteConfig::default();
        let context = ctx(&resolver, &theme, &site);

        let doc = file("my-project", "page", "[Doc](foo.md#sec)\n\n[Abs](/api/ref.md)\n");
        let page = transform_file(doc, &context);

        let raw = String::from_utf8(page.raw).unwrap();
        assert!(raw.contains("[Doc](../foo/#sec)"));
        assert!(raw.contains("[Abs](/my-project/api/ref/)"));
    }

    #[test]
    fn full_pipeline_scenario_six_index_page() {
        let repos: Vec<Repository> = Vec::new();
        let forges = ForgesConfig::new();
        let resolver = EditLinkResolver::new(&repos, &forges);
        let theme = DefaultTheme::default();
        let site = SiteConfig::default();
        let context = ctx(&resolver, &theme, &site);

        let doc = file("demo", "README", "[Doc](foo.md)\n\n[Up](../other.md)\n");
        let page = transform_file(doc, &context);
        let raw = String::from_utf8(page.raw).unwrap();
        assert!(raw.contains("[Doc](foo/)"));
        assert!(raw.contains("[Up](../other/)"));
    }

    #[test]
    fn pipeline_is_idempotent() {
        let repos = vec![Repository {
            name: "demo".to_string(),
            clone_url: "https://github.com/acme/demo.git".to_string(),
            branch: "main".to_string(),
            paths: Vec::new(),
            tags: BTreeMap::new(),
            forge: None,
        }];
        let forges = ForgesConfig::new();
        let resolver = EditLinkResolver::new(&repos, &forges);
        let theme = DefaultTheme::default();
        let site = SiteConfig::default();
        let context = ctx(&resolver, &theme, &site);

        let doc = file("demo", "page", "[Doc](foo.md)\nHello\n");
        let first_pass = transform_file(doc, &context);
        let raw_bytes = first_pass.raw.clone();

        let second_input = DocFile { content: raw_bytes.clone(), ..first_pass.file };
        let second_pass = transform_file(second_input, &context);

        assert_eq!(second_pass.raw, raw_bytes);
    }

    #[test]
    fn anchors_and_absolute_links_are_untouched() {
        assert_eq!(rewrite_link("#just-an-anchor", false, "repo"), None);
        assert_eq!(rewrite_link("https://example.com/a.md", false, "repo"), None);
        assert_eq!(rewrite_link("mailto:me@example.com", false, "repo"), None);
    }
}
