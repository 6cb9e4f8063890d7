//! Typed extraction strategies behind the `FieldExtractor` interface.
//!
//! A strategy only locates raw text; turning that text into a typed value is
//! the resolver's parse stage.

use std::fmt;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::config::{FieldKind, StrategySpec};
use super::{ParsingError, ParsingResult};

/// One step of a field's fallback chain.
pub trait FieldExtractor: Send + Sync + fmt::Debug {
    /// Short description used in logs.
    fn describe(&self) -> &str;

    /// Locate raw text for the field inside `node`. `Ok(None)` means the
    /// strategy did not apply; the DOM is never mutated.
    fn extract(&self, node: ElementRef<'_>) -> ParsingResult<Option<String>>;
}

/// Collapse runs of whitespace in an element's text into single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: &str) -> Option<String> {
    let value = collapse_whitespace(value);
    (!value.is_empty()).then_some(value)
}

fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

#[derive(Debug)]
pub struct AttributeExtractor {
    label: String,
    selector: Selector,
    attribute: String,
}

impl AttributeExtractor {
    pub fn new(selector: &str, attribute: &str) -> ParsingResult<Self> {
        Ok(Self {
            label: format!("attribute({selector} @{attribute})"),
            selector: compile_selector(selector)?,
            attribute: attribute.to_string(),
        })
    }
}

impl FieldExtractor for AttributeExtractor {
    fn describe(&self) -> &str {
        &self.label
    }

    fn extract(&self, node: ElementRef<'_>) -> ParsingResult<Option<String>> {
        let own = std::iter::once(node).filter(|n| self.selector.matches(n));
        Ok(own
            .chain(node.select(&self.selector))
            .find_map(|el| el.value().attr(&self.attribute).and_then(non_empty)))
    }
}

#[derive(Debug)]
pub struct CssTextExtractor {
    label: String,
    selector: Selector,
}

impl CssTextExtractor {
    pub fn new(selector: &str) -> ParsingResult<Self> {
        Ok(Self {
            label: format!("css_text({selector})"),
            selector: compile_selector(selector)?,
        })
    }
}

impl FieldExtractor for CssTextExtractor {
    fn describe(&self) -> &str {
        &self.label
    }

    fn extract(&self, node: ElementRef<'_>) -> ParsingResult<Option<String>> {
        Ok(node
            .select(&self.selector)
            .map(element_text)
            .find(|text| !text.is_empty()))
    }
}

#[derive(Debug)]
pub struct TextPatternExtractor {
    label: String,
    pattern: Regex,
}

impl TextPatternExtractor {
    pub fn new(pattern: &str) -> ParsingResult<Self> {
        Ok(Self {
            label: format!("text_pattern({pattern})"),
            pattern: Regex::new(pattern).map_err(|e| ParsingError::invalid_pattern(pattern, e))?,
        })
    }
}

impl FieldExtractor for TextPatternExtractor {
    fn describe(&self) -> &str {
        &self.label
    }

    fn extract(&self, node: ElementRef<'_>) -> ParsingResult<Option<String>> {
        let text = element_text(node);
        Ok(self.pattern.captures(&text).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .and_then(|m| non_empty(m.as_str()))
        }))
    }
}

/// Generic text fallback: the first text node that looks like a free-text
/// label (5-100 chars, not purely digits, no currency sign).
#[derive(Debug)]
pub struct GenericTagExtractor {
    label: String,
    tags: Vec<String>,
}

impl GenericTagExtractor {
    pub const MIN_LEN: usize = 5;
    pub const MAX_LEN: usize = 100;

    pub fn new(tags: &[String]) -> Self {
        Self {
            label: format!("generic_tag({})", tags.join(",")),
            tags: tags.iter().map(|t| t.trim().to_lowercase()).collect(),
        }
    }

    fn is_plausible_label(text: &str) -> bool {
        let len = text.chars().count();
        (Self::MIN_LEN..=Self::MAX_LEN).contains(&len)
            && !text.chars().all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace())
            && !text.contains(['¥', '￥'])
    }
}

impl FieldExtractor for GenericTagExtractor {
    fn describe(&self) -> &str {
        &self.label
    }

    fn extract(&self, node: ElementRef<'_>) -> ParsingResult<Option<String>> {
        let found = node.descendants().find_map(|descendant| {
            let text = descendant.value().as_text()?;
            if !self.tags.is_empty() {
                let parent = descendant.parent()?;
                let name = parent.value().as_element()?.name();
                if !self.tags.iter().any(|t| t == name) {
                    return None;
                }
            }
            let text = collapse_whitespace(text);
            Self::is_plausible_label(&text).then_some(text)
        });
        Ok(found)
    }
}

/// Compile a configured strategy into its extractor.
pub fn compile_strategy(spec: &StrategySpec) -> ParsingResult<Box<dyn FieldExtractor>> {
    Ok(match spec {
        StrategySpec::Attribute { selector, attribute } => {
            Box::new(AttributeExtractor::new(selector, attribute)?)
        }
        StrategySpec::CssText { selector } => Box::new(CssTextExtractor::new(selector)?),
        StrategySpec::TextPattern { pattern } => Box::new(TextPatternExtractor::new(pattern)?),
        StrategySpec::GenericTag { tags } => Box::new(GenericTagExtractor::new(tags)),
    })
}

/// Compile a whole chain, dropping invalid entries with a warning.
pub fn compile_chain(field: FieldKind, specs: &[StrategySpec]) -> ParsingResult<Vec<Box<dyn FieldExtractor>>> {
    let mut compiled = Vec::with_capacity(specs.len());
    for spec in specs {
        match compile_strategy(spec) {
            Ok(extractor) => compiled.push(extractor),
            Err(e) => tracing::warn!("Dropping {} strategy {:?}: {}", field, spec, e),
        }
    }
    if compiled.is_empty() {
        return Err(ParsingError::EmptyStrategyChain { field });
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    #[test]
    fn test_attribute_prefers_node_itself() {
        let doc = Html::parse_fragment(
            r#"<div class="cell" data-item-id="m1"><span data-item-id="m2">inner</span></div>"#,
        );
        let node = first(&doc, "div.cell");
        let extractor = AttributeExtractor::new("[data-item-id]", "data-item-id").unwrap();
        assert_eq!(extractor.extract(node).unwrap().as_deref(), Some("m1"));
    }

    #[test]
    fn test_attribute_skips_empty_values() {
        let doc = Html::parse_fragment(
            r#"<div id="n"><img src="" /><img src="https://static.mercdn.net/a.jpg" /></div>"#,
        );
        let extractor = AttributeExtractor::new("img", "src").unwrap();
        assert_eq!(
            extractor.extract(first(&doc, "#n")).unwrap().as_deref(),
            Some("https://static.mercdn.net/a.jpg")
        );
    }

    #[test]
    fn test_css_text_collapses_whitespace() {
        let doc = Html::parse_fragment(
            r#"<div id="n"><span class="title">  Nintendo
                 Switch  <b>OLED</b></span></div>"#,
        );
        let extractor = CssTextExtractor::new(".title").unwrap();
        assert_eq!(
            extractor.extract(first(&doc, "#n")).unwrap().as_deref(),
            Some("Nintendo Switch OLED")
        );
    }

    #[test]
    fn test_text_pattern_uses_capture_group() {
        let doc = Html::parse_fragment(r#"<div id="n">送料込み ¥12,800 (税込)</div>"#);
        let extractor = TextPatternExtractor::new(r"[¥￥]\s*([0-9][0-9,]*)").unwrap();
        assert_eq!(extractor.extract(first(&doc, "#n")).unwrap().as_deref(), Some("12,800"));
    }

    #[test]
    fn test_generic_tag_skips_prices_and_short_text() {
        let doc = Html::parse_fragment(
            r#"<div id="n"><span>¥3,000</span><span>123456</span><span>new</span><span>Pokemon Card Pikachu</span></div>"#,
        );
        let extractor = GenericTagExtractor::new(&["span".to_string()]);
        assert_eq!(
            extractor.extract(first(&doc, "#n")).unwrap().as_deref(),
            Some("Pokemon Card Pikachu")
        );
    }

    #[test]
    fn test_invalid_entries_are_dropped_from_chain() {
        let specs = vec![
            StrategySpec::css_text("[[broken"),
            StrategySpec::text_pattern("(unclosed"),
            StrategySpec::css_text(".title"),
        ];
        let chain = compile_chain(FieldKind::Title, &specs).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].describe(), "css_text(.title)");
    }

    #[test]
    fn test_chain_without_valid_entries_is_an_error() {
        let specs = vec![StrategySpec::css_text("[[broken")];
        let err = compile_chain(FieldKind::Price, &specs).unwrap_err();
        assert_eq!(err, ParsingError::EmptyStrategyChain { field: FieldKind::Price });
    }
}
