//! Blog post detection and record extraction for Dolma documents

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

/// Hosting platforms whose (sub)domains are blogs
pub const BLOG_DOMAINS: &[&str] = &[
    "wordpress.com",
    "blogspot.com",
    "medium.com",
    "substack.com",
    "tumblr.com",
    "ghost.io",
    "weebly.com",
    "wixsite.com",
    "squarespace.com",
    "livejournal.com",
    "typepad.com",
    "hubpages.com",
    "dev.to",
    "hashnode.dev",
    "github.io",
    "gitlab.io",
    "netlify.app",
    "vercel.app",
    "notion.site",
    "over-blog.com",
    "canalblog.com",
    "hatena.ne.jp",
    "ameblo.jp",
    "blog.sina.com.cn",
];

/// Index pages that live under a blog path but are not articles
const INDEX_PATH_MARKERS: [&str; 3] = ["/category/", "/tag/", "/author/"];

/// CSV column order
pub const CSV_HEADER: [&str; 6] = ["id", "url", "created", "added", "source", "text"];

fn is_blog_domain(host: &str) -> bool {
    BLOG_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// `blog`, `blog2`, ... as a non-final host label
fn has_blog_subdomain(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    labels.len() > 1
        && labels[..labels.len() - 1].iter().any(|label| {
            label
                .strip_prefix("blog")
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        })
}

fn has_blog_segment(path: &str) -> bool {
    path.split('/')
        .skip(1)
        .any(|segment| segment == "blog" || segment == "blogs")
}

/// Returns true if the URL likely points at a blog article.
///
/// Matching is case-insensitive. A known blog platform domain or a
/// `blog`/`blogN` subdomain is enough; otherwise the path needs a `blog`
/// or `blogs` segment and must not be a category, tag or author index.
pub fn is_blog_url(url: &str) -> bool {
    let lower = url.to_lowercase();

    let (host, path) = match Url::parse(&lower) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or_default().to_string(),
            parsed.path().to_string(),
        ),
        Err(_) => {
            let end = lower.find(['?', '#']).unwrap_or(lower.len());
            (String::new(), lower[..end].to_string())
        }
    };

    if is_blog_domain(&host) || has_blog_subdomain(&host) {
        return true;
    }

    has_blog_segment(&path) && !INDEX_PATH_MARKERS.iter().any(|m| path.contains(m))
}

/// One CSV row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogRecord {
    pub id: String,
    pub url: String,
    pub created: String,
    pub added: String,
    pub source: String,
    pub text: String,
}

/// Why a document was not kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Valid JSON, but not an object
    NotAnObject,
    /// No `metadata.url` or no `text`
    MissingField,
    /// Text shorter than the configured minimum
    TooShort,
    /// URL does not look like a blog
    NotBlog,
}

fn as_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Classify one parsed JSONL document
pub fn extract_record(doc: &Value, min_text_length: usize) -> Result<BlogRecord, Rejection> {
    if !doc.is_object() {
        return Err(Rejection::NotAnObject);
    }
    let url = doc
        .get("metadata")
        .and_then(|m| m.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let text = doc.get("text").and_then(Value::as_str).unwrap_or_default();

    if url.is_empty() || text.is_empty() {
        return Err(Rejection::MissingField);
    }
    if text.chars().count() < min_text_length {
        return Err(Rejection::TooShort);
    }
    if !is_blog_url(url) {
        return Err(Rejection::NotBlog);
    }

    Ok(BlogRecord {
        id: as_cell(doc.get("id")),
        url: url.to_string(),
        created: as_cell(doc.get("created")),
        added: as_cell(doc.get("added")),
        source: as_cell(doc.get("source")),
        text: text.trim().replace('\n', " "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_platform_domains() {
        assert!(is_blog_url("https://someone.wordpress.com/2020/01/hello"));
        assert!(is_blog_url("https://MEDIUM.com/@writer/post-123"));
        assert!(is_blog_url("https://user.github.io/"));
        assert!(is_blog_url("http://blog.sina.com.cn/s/blog_1.html"));
        assert!(!is_blog_url("https://notmedium.com/article"));
    }

    #[test]
    fn test_blog_subdomain() {
        assert!(is_blog_url("https://blog.example.com/anything"));
        assert!(is_blog_url("https://blog2.example.org/"));
        assert!(is_blog_url("https://www.blog.example.org/"));
        assert!(!is_blog_url("https://blogger-tools.example.com/"));
        assert!(!is_blog_url("https://example.blog/"));
    }

    #[test]
    fn test_blog_path() {
        assert!(is_blog_url("https://example.com/blog/my-first-post"));
        assert!(is_blog_url("https://example.com/Blogs"));
        assert!(is_blog_url("https://example.com/en/blog?page=2"));
        assert!(!is_blog_url("https://example.com/blogging/tips"));
        assert!(!is_blog_url("https://example.com/news/2021/story"));
    }

    #[test]
    fn test_index_pages_rejected() {
        assert!(!is_blog_url("https://example.com/blog/category/rust/"));
        assert!(!is_blog_url("https://example.com/blog/tag/hpc/"));
        assert!(!is_blog_url("https://example.com/blog/author/jo/"));
        // Platform domains win over the index filter
        assert!(is_blog_url("https://x.wordpress.com/category/misc/"));
    }

    #[test]
    fn test_unparseable_falls_back_to_path() {
        assert!(is_blog_url("example.com/blog/post"));
        assert!(!is_blog_url("not a url at all"));
    }

    #[test]
    fn test_extract_record_kept() {
        let doc = json!({
            "id": 42,
            "text": "  First line\nSecond line  ",
            "created": "2021-03-01",
            "added": null,
            "source": "common-crawl",
            "metadata": {"url": "https://blog.example.com/p/1"}
        });

        let rec = extract_record(&doc, 5).unwrap();
        assert_eq!(rec.id, "42");
        assert_eq!(rec.added, "");
        assert_eq!(rec.text, "First line Second line");
        assert_eq!(rec.url, "https://blog.example.com/p/1");
    }

    #[test]
    fn test_extract_record_rejections() {
        assert_eq!(extract_record(&json!([1, 2]), 0), Err(Rejection::NotAnObject));
        assert_eq!(extract_record(&json!("text"), 0), Err(Rejection::NotAnObject));

        let no_url = json!({"text": "hello"});
        assert_eq!(extract_record(&no_url, 0), Err(Rejection::MissingField));

        let empty_text = json!({"text": "", "metadata": {"url": "https://blog.x.com/"}});
        assert_eq!(extract_record(&empty_text, 0), Err(Rejection::MissingField));

        let short = json!({"text": "héllo", "metadata": {"url": "https://blog.x.com/"}});
        assert_eq!(extract_record(&short, 6), Err(Rejection::TooShort));
        assert!(extract_record(&short, 5).is_ok());

        let news = json!({"text": "hello", "metadata": {"url": "https://news.example.com/"}});
        assert_eq!(extract_record(&news, 0), Err(Rejection::NotBlog));
    }
}
