//! Selector chain resolver
//!
//! Tries a field's strategies in order; the first one whose text survives the
//! field's parse stage wins. A strategy error or a parse failure moves on to
//! the next strategy.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use tracing::debug;
use url::Url;

use super::config::{ExtractionConfig, FieldKind};
use super::field_extractor::{FieldExtractor, collapse_whitespace, compile_chain};
use super::{ParsingError, ParsingResult};
use crate::domain::product::Condition;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("static regex"));
static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("static regex"));

const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 199;

/// Value produced by a successful parse stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Price(u64),
    Rating(f32),
    Condition(Condition),
    Url(String),
}

impl RawValue {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) | Self::Url(text) => Some(text),
            _ => None,
        }
    }

    pub const fn as_price(&self) -> Option<u64> {
        match self {
            Self::Price(price) => Some(*price),
            _ => None,
        }
    }

    pub const fn as_rating(&self) -> Option<f32> {
        match self {
            Self::Rating(rating) => Some(*rating),
            _ => None,
        }
    }

    pub const fn as_condition(&self) -> Option<Condition> {
        match self {
            Self::Condition(condition) => Some(*condition),
            _ => None,
        }
    }
}

pub struct SelectorChainResolver {
    chains: HashMap<FieldKind, Vec<Box<dyn FieldExtractor>>>,
    base_url: Url,
    image_hosts: Vec<String>,
}

impl std::fmt::Debug for SelectorChainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes: HashMap<_, _> = self.chains.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("SelectorChainResolver")
            .field("chains", &sizes)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SelectorChainResolver {
    pub fn from_config(config: &ExtractionConfig) -> ParsingResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ParsingError::configuration("base_url", format!("{}: {e}", config.base_url)))?;

        let mut chains = HashMap::new();
        for field in FieldKind::ALL {
            chains.insert(field, compile_chain(field, config.selectors.chain(field))?);
        }

        Ok(Self {
            chains,
            base_url,
            image_hosts: config.image_hosts.iter().map(|h| h.to_lowercase()).collect(),
        })
    }

    /// Replace one field's chain with custom extractors.
    #[must_use]
    pub fn with_chain(mut self, field: FieldKind, strategies: Vec<Box<dyn FieldExtractor>>) -> Self {
        self.chains.insert(field, strategies);
        self
    }

    pub fn strategy_count(&self, field: FieldKind) -> usize {
        self.chains.get(&field).map_or(0, Vec::len)
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// First-match-wins resolution of `field` inside `node`.
    pub fn resolve(&self, field: FieldKind, node: ElementRef<'_>) -> Option<RawValue> {
        let strategies = self.chains.get(&field)?;
        for strategy in strategies {
            match strategy.extract(node) {
                Ok(Some(text)) => match self.parse_stage(field, &text) {
                    Ok(value) => {
                        debug!("{} resolved by {}", field, strategy.describe());
                        return Some(value);
                    }
                    Err(e) => {
                        debug!("{} text from {} rejected: {}", field, strategy.describe(), e);
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    debug!("{} strategy {} failed: {}", field, strategy.describe(), e);
                }
            }
        }
        None
    }

    /// Turn raw strategy text into a typed value for `field`.
    pub fn parse_stage(&self, field: FieldKind, text: &str) -> ParsingResult<RawValue> {
        let reject = |reason: &str| ParsingError::field_extraction_failed(field, "parse", reason);
        match field {
            FieldKind::Price => parse_price(text)
                .map(RawValue::Price)
                .ok_or_else(|| reject("no positive price")),
            FieldKind::Rating => parse_rating(text)
                .map(RawValue::Rating)
                .ok_or_else(|| reject("no rating within 0-5")),
            FieldKind::Condition => Condition::from_text(text)
                .map(RawValue::Condition)
                .ok_or_else(|| reject("unrecognised condition label")),
            FieldKind::Image => {
                let cleaned = clean_image_url(text, &self.base_url);
                if is_allowed_image(&cleaned, &self.image_hosts) {
                    Ok(RawValue::Url(cleaned))
                } else {
                    Err(reject("image outside the CDN allow-list"))
                }
            }
            FieldKind::Link => self.resolve_link(text).map(RawValue::Url),
            FieldKind::ItemId => parse_item_id(text)
                .map(RawValue::Text)
                .ok_or_else(|| reject("no item id")),
            FieldKind::Title => {
                let title = collapse_whitespace(text);
                let len = title.chars().count();
                if (TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&len) {
                    Ok(RawValue::Text(title))
                } else {
                    Err(reject("title length out of range"))
                }
            }
            FieldKind::Category | FieldKind::Brand | FieldKind::Description => {
                let value = collapse_whitespace(text);
                if value.is_empty() {
                    Err(reject("empty text"))
                } else {
                    Ok(RawValue::Text(value))
                }
            }
        }
    }

    fn resolve_link(&self, href: &str) -> ParsingResult<String> {
        let href = href.trim();
        let url = self
            .base_url
            .join(href)
            .map_err(|e| ParsingError::url_resolution_failed(href, e, Some(self.base_url.as_str())))?;
        match url.scheme() {
            "http" | "https" => Ok(url.to_string()),
            scheme => Err(ParsingError::url_resolution_failed(
                href,
                format!("unsupported scheme {scheme}"),
                Some(self.base_url.as_str()),
            )),
        }
    }
}

/// Strip currency marks and thousands separators, then take the first digit
/// run. Zero is not a price.
pub fn parse_price(text: &str) -> Option<u64> {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '¥' | '￥' | ','))
        .collect();
    DIGITS
        .find(&stripped)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .filter(|price| *price > 0)
}

pub fn parse_rating(text: &str) -> Option<f32> {
    DECIMAL
        .find(text)
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .filter(|rating| (0.0..=5.0).contains(rating))
}

/// Extract the listing id from an `/item/<id>` path or accept a bare
/// alphanumeric id.
pub fn parse_item_id(text: &str) -> Option<String> {
    let text = text.trim();
    if let Some((_, tail)) = text.rsplit_once("/item/") {
        let id = tail.split(['?', '#', '/']).next().unwrap_or_default();
        return (!id.is_empty() && id != "item").then(|| id.to_string());
    }
    (!text.is_empty()
        && text.len() <= 64
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
    .then(|| text.to_string())
}

/// Drop query and fragment and make protocol-relative or root-relative URLs
/// absolute.
pub fn clean_image_url(raw: &str, base: &Url) -> String {
    let trimmed = raw.trim();
    let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
    if let Some(rest) = without_query.strip_prefix("//") {
        format!("https://{rest}")
    } else if without_query.starts_with('/') {
        base.join(without_query)
            .map_or_else(|_| without_query.to_string(), |u| u.to_string())
    } else {
        without_query.to_string()
    }
}

pub fn is_allowed_image(url: &str, hosts: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str().map(str::to_lowercase) else {
        return false;
    };
    hosts
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::parsing::config::StrategySpec;
    use rstest::rstest;
    use scraper::{Html, Selector};

    #[derive(Debug)]
    struct Exploding;

    impl FieldExtractor for Exploding {
        fn describe(&self) -> &str {
            "exploding"
        }

        fn extract(&self, _node: ElementRef<'_>) -> ParsingResult<Option<String>> {
            Err(ParsingError::field_extraction_failed(FieldKind::Title, "exploding", "boom"))
        }
    }

    fn resolver() -> SelectorChainResolver {
        SelectorChainResolver::from_config(&ExtractionConfig::default()).unwrap()
    }

    fn node<'a>(doc: &'a Html) -> ElementRef<'a> {
        doc.select(&Selector::parse("#n").unwrap()).next().unwrap()
    }

    #[rstest]
    #[case("¥12,800", Some(12_800))]
    #[case("￥ 3,000 送料込み", Some(3_000))]
    #[case("1,200円", Some(1_200))]
    #[case("¥0", None)]
    #[case("SOLD", None)]
    fn test_parse_price(#[case] text: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_price(text), expected);
    }

    #[rstest]
    #[case("4.8", Some(4.8))]
    #[case("評価 5", Some(5.0))]
    #[case("7.5", None)]
    #[case("n/a", None)]
    fn test_parse_rating(#[case] text: &str, #[case] expected: Option<f32>) {
        assert_eq!(parse_rating(text), expected);
    }

    #[rstest]
    #[case("/item/m12345678901?source=search", Some("m12345678901"))]
    #[case("https://jp.mercari.com/item/m987#top", Some("m987"))]
    #[case("m55555", Some("m55555"))]
    #[case("/item/", None)]
    #[case("not an id", None)]
    fn test_parse_item_id(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_item_id(text).as_deref(), expected);
    }

    #[test]
    fn test_clean_image_url() {
        let base = Url::parse("https://jp.mercari.com").unwrap();
        assert_eq!(
            clean_image_url("//static.mercdn.net/a.jpg?w=300", &base),
            "https://static.mercdn.net/a.jpg"
        );
        assert_eq!(
            clean_image_url("/thumb/a.jpg", &base),
            "https://jp.mercari.com/thumb/a.jpg"
        );
    }

    #[test]
    fn test_image_allow_list() {
        let hosts = vec!["mercdn.net".to_string(), "mercari.com".to_string()];
        assert!(is_allowed_image("https://static.mercdn.net/item/a.jpg", &hosts));
        assert!(is_allowed_image("https://jp.mercari.com/a.jpg", &hosts));
        assert!(!is_allowed_image("https://images.unsplash.com/photo.jpg", &hosts));
        assert!(!is_allowed_image("https://evilmercdn.net/a.jpg", &hosts));
        assert!(!is_allowed_image("data:image/png;base64,AAAA", &hosts));
    }

    #[test]
    fn test_parse_failure_moves_to_next_strategy() {
        // `.price` matches but carries no number; the text pattern still wins.
        let doc = Html::parse_fragment(
            r#"<div id="n"><span class="price">SOLD</span><span>¥4,500</span></div>"#,
        );
        let value = resolver().resolve(FieldKind::Price, node(&doc));
        assert_eq!(value, Some(RawValue::Price(4_500)));
    }

    #[test]
    fn test_failing_strategy_is_treated_as_no_value() {
        let doc = Html::parse_fragment(r#"<div id="n"><h3>Nintendo Switch OLED</h3></div>"#);
        let fallback = compile_chain(FieldKind::Title, &[StrategySpec::css_text("h3")]).unwrap();
        let mut strategies: Vec<Box<dyn FieldExtractor>> = vec![Box::new(Exploding)];
        strategies.extend(fallback);
        let resolver = resolver().with_chain(FieldKind::Title, strategies);

        let value = resolver.resolve(FieldKind::Title, node(&doc));
        assert_eq!(value, Some(RawValue::Text("Nintendo Switch OLED".to_string())));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let doc = Html::parse_fragment(
            r#"<div id="n"><a href="/item/m1"><img src="https://static.mercdn.net/x.jpg"></a>
               <span data-testid="item-name">iPhone 14 Pro</span></div>"#,
        );
        let resolver = resolver();
        for field in FieldKind::ALL {
            assert_eq!(
                resolver.resolve(field, node(&doc)),
                resolver.resolve(field, node(&doc)),
                "{field}"
            );
        }
    }

    #[test]
    fn test_non_cdn_image_is_rejected() {
        let doc = Html::parse_fragment(
            r#"<div id="n"><img src="https://images.unsplash.com/photo-1.jpg"></div>"#,
        );
        assert_eq!(resolver().resolve(FieldKind::Image, node(&doc)), None);
    }
}
