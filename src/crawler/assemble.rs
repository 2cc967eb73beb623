//! Field extraction and record assembly.

use crate::browser::{find_text, try_find_text, BrowserSession, Scope};
use crate::config::CrawlConfig;
use crate::record::{
    content_hash, limit_words, parse_published, smart_truncate, ArticleRecord, RecordAttribute,
    PUBLISHED_FORMAT, REVIEW_MAX, TITLE_MAX,
};
use anyhow::{Context, Result};
use chrono::Local;

/// Extension attribute key carrying a site-native article identifier.
const ADDITIONAL_ID_KEY: &str = "Additional_ID";

/// Extract one article record from the given scope.
///
/// Field selectors that are absent or match nothing yield empty fields.
/// The review falls back to the body text when its own selector yields
/// nothing; body and review honor the configured word limit; the title
/// and review are bounded at a word boundary. An unparseable published
/// string falls back to the collection time.
pub async fn extract_record(
    session: &mut dyn BrowserSession,
    config: &CrawlConfig,
    scope: Scope,
) -> Result<ArticleRecord> {
    let selectors = &config.selectors;

    let title = find_text(session, scope, selectors.title.as_ref()).await;
    let content = find_text(session, scope, selectors.article_full_text.as_ref()).await;
    let description = try_find_text(session, scope, selectors.article_description.as_ref())
        .await
        .filter(|text| !text.trim().is_empty());

    let mut record = ArticleRecord::new(&config.source_id);
    record.title = smart_truncate(&title, TITLE_MAX);
    record.content = limit_words(&content, config.word_limit);
    let review = description.unwrap_or_else(|| record.content.clone());
    record.review = smart_truncate(&limit_words(&review, config.word_limit), REVIEW_MAX);
    record.author = find_text(session, scope, selectors.author.as_ref()).await;

    let published_text = find_text(session, scope, selectors.published.as_ref()).await;
    let published = parse_published(&published_text).unwrap_or_else(Local::now);
    record.published = published.format(PUBLISHED_FORMAT).to_string();

    record.link = session
        .current_url()
        .await
        .context("reading article url")?;
    record.source = config.source_url();
    record.hash = content_hash(&record.author, &record.title, &record.review);

    if let Some(id_text) = try_find_text(session, scope, selectors.additional_id.as_ref()).await {
        if !id_text.trim().is_empty() {
            record
                .attributes
                .push(RecordAttribute::new(ADDITIONAL_ID_KEY, id_text.trim()));
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::FixtureSession;
    use crate::config::{CrawlConfig, SourceParams};

    const ARTICLE: &str = r#"<html><body>
        <h1 class="headline">Quiet release fixes a loud bug</h1>
        <div class="byline">J. Writer</div>
        <time class="when">14.03.2026 09:30</time>
        <span class="native-id">story-991</span>
        <div class="body">First sentence of the body. Second sentence with more words.</div>
    </body></html>"#;

    fn config(description: &str) -> CrawlConfig {
        let mut params = SourceParams {
            id: "src-1".to_string(),
            target: "https://fixture.test/a1".to_string(),
            ..Default::default()
        };
        params.selectors.title = "class: headline".to_string();
        params.selectors.article_full_text = "class: body".to_string();
        params.selectors.article_description = description.to_string();
        params.selectors.author = "class: byline".to_string();
        params.selectors.published = "class: when".to_string();
        params.selectors.additional_id = "class: native-id".to_string();
        CrawlConfig::resolve(&params).unwrap()
    }

    async fn session() -> FixtureSession {
        let factory = FixtureSession::builder()
            .doc("https://fixture.test/a1", ARTICLE)
            .into_factory();
        let mut s = factory.session();
        s.goto("https://fixture.test/a1").await.unwrap();
        s
    }

    #[tokio::test]
    async fn test_extracts_all_fields() {
        let mut s = session().await;
        let cfg = config("");
        let record = extract_record(&mut s, &cfg, Scope::Page).await.unwrap();

        assert_eq!(record.title, "Quiet release fixes a loud bug");
        assert_eq!(record.author, "J. Writer");
        assert_eq!(record.published, "14.03.2026 - 09:30");
        assert_eq!(record.link, "https://fixture.test/a1");
        assert_eq!(record.source_id, "src-1");
        assert_eq!(record.hash.len(), 64);
        assert_eq!(record.attributes.len(), 1);
        assert_eq!(record.attributes[0].key, "Additional_ID");
        assert_eq!(record.attributes[0].value, "story-991");
        assert!(record.attributes[0].binary_value.is_empty());
    }

    #[tokio::test]
    async fn test_review_falls_back_to_body() {
        let mut s = session().await;
        let cfg = config("css: .no-such-summary");
        let record = extract_record(&mut s, &cfg, Scope::Page).await.unwrap();
        assert_eq!(record.review, record.content);
        assert!(record.content.starts_with("First sentence"));
    }

    #[tokio::test]
    async fn test_word_limit_applies_to_body_and_review() {
        let mut s = session().await;
        let mut cfg = config("");
        cfg.word_limit = 3;
        let record = extract_record(&mut s, &cfg, Scope::Page).await.unwrap();
        assert_eq!(record.content, "First sentence of");
        assert_eq!(record.review, "First sentence of");
    }

    #[tokio::test]
    async fn test_unparseable_published_falls_back_to_now() {
        let factory = FixtureSession::builder()
            .doc(
                "https://fixture.test/a1",
                r#"<html><body><h1 class="headline">T</h1>
                   <time class="when">no date here</time></body></html>"#,
            )
            .into_factory();
        let mut s = factory.session();
        s.goto("https://fixture.test/a1").await.unwrap();

        let record = extract_record(&mut s, &config(""), Scope::Page).await.unwrap();
        let today = Local::now().format("%d.%m.%Y").to_string();
        assert!(record.published.starts_with(&today), "{}", record.published);
    }
}
