//! Mapping a rendered results page to product records

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{ScrapeError, ScrapeWarning};
use crate::models::ProductRecord;
use crate::traits::SiteProfile;

/// How far above a title anchor the product container may sit
const MAX_ANCESTOR_DEPTH: usize = 5;

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[₹$€£¥]|\b(?:USD|EUR|GBP|INR|JPY|CAD|AUD)\b)\s?\d[\d.,]*|\d[\d.,]*\s?[€£]")
        .expect("price pattern is valid")
});
static ISO_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(USD|EUR|GBP|INR|JPY|CAD|AUD)\b").expect("currency pattern is valid")
});
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("number pattern is valid"));
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d.,]*)\s*([KkMm])?").expect("count pattern is valid"));

/// Where a field's value is read from once its element is found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Text,
    /// Text, or the `aria-label` when the text is empty
    TextOrAriaLabel,
    Attr(&'static str),
}

/// Locates one field inside a product container
#[derive(Debug, Clone)]
pub struct FieldLocator {
    field: &'static str,
    selector: Selector,
    source: FieldSource,
}

impl FieldLocator {
    pub fn parse(field: &'static str, css: &str, source: FieldSource) -> Result<Self, ScrapeError> {
        let selector = parse_selector(field, css)?;
        Ok(Self {
            field,
            selector,
            source,
        })
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// First non-empty value among the matching elements
    pub fn locate(&self, item: ElementRef<'_>) -> Option<String> {
        item.select(&self.selector)
            .find_map(|element| read(element, self.source))
    }
}

fn parse_selector(field: &str, css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| {
        ScrapeError::Configuration(format!("failed to parse {field} selector {css:?}: {e:?}"))
    })
}

fn read(element: ElementRef<'_>, source: FieldSource) -> Option<String> {
    match source {
        FieldSource::Text => non_empty(collapse_whitespace(&element.text().collect::<String>())),
        FieldSource::TextOrAriaLabel => {
            non_empty(collapse_whitespace(&element.text().collect::<String>())).or_else(|| {
                element
                    .value()
                    .attr("aria-label")
                    .and_then(|label| non_empty(collapse_whitespace(label)))
            })
        }
        FieldSource::Attr(name) => element
            .value()
            .attr(name)
            .and_then(|value| non_empty(value.trim().to_string())),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Records pulled from one page snapshot
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<ProductRecord>,
    /// Containers skipped because no title could be read
    pub dropped_untitled: usize,
    /// Containers skipped because an identical record was already emitted
    pub duplicates: usize,
    /// Anchors skipped because their card resolved to one already used
    pub unplaced: usize,
}

impl Extraction {
    pub fn warnings(&self) -> Vec<ScrapeWarning> {
        let mut warnings = Vec::new();
        if self.dropped_untitled > 0 {
            warnings.push(ScrapeWarning::ItemsWithoutTitle {
                dropped: self.dropped_untitled,
            });
        }
        if self.duplicates > 0 {
            warnings.push(ScrapeWarning::DuplicatesDropped {
                dropped: self.duplicates,
            });
        }
        if self.unplaced > 0 {
            warnings.push(ScrapeWarning::ItemsWithoutContainer {
                dropped: self.unplaced,
            });
        }
        warnings
    }
}

/// Turns result page HTML into [`ProductRecord`]s using the site's locators
#[derive(Debug, Clone)]
pub struct Extractor {
    site: SiteProfile,
    anchor: Selector,
    container: Selector,
    price_probe: Selector,
    image: Selector,
    title: FieldLocator,
    price: FieldLocator,
    link: FieldLocator,
    seller: Option<FieldLocator>,
    rating: Option<FieldLocator>,
    review_count: Option<FieldLocator>,
    delivery: Option<FieldLocator>,
}

impl Extractor {
    /// Compiles every selector of the site profile up front
    pub fn new(site: &SiteProfile) -> Result<Self, ScrapeError> {
        let selectors = &site.selectors;
        let optional = |field: &'static str, css: &Option<String>, source| {
            css.as_deref()
                .map(|css| FieldLocator::parse(field, css, source))
                .transpose()
        };

        Ok(Self {
            site: site.clone(),
            anchor: parse_selector("item anchor", &selectors.item_anchor)?,
            container: parse_selector("item container", &selectors.item_container)?,
            price_probe: parse_selector("price", &selectors.price)?,
            image: parse_selector("image", &selectors.image)?,
            title: FieldLocator::parse("title", &selectors.title, FieldSource::Text)?,
            price: FieldLocator::parse("price", &selectors.price, FieldSource::TextOrAriaLabel)?,
            link: FieldLocator::parse("link", &selectors.link, FieldSource::Attr("href"))?,
            seller: optional("seller", &selectors.seller, FieldSource::Text)?,
            rating: optional("rating", &selectors.rating, FieldSource::TextOrAriaLabel)?,
            review_count: optional("review count", &selectors.review_count, FieldSource::Text)?,
            delivery: optional("delivery", &selectors.delivery, FieldSource::Text)?,
        })
    }

    /// Extracts records in document order.
    ///
    /// A field that cannot be located is left empty; a container without a
    /// title is skipped and counted.
    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);
        let mut extraction = Extraction::default();
        let mut seen_ids = HashSet::new();

        let (containers, unplaced) = self.containers(&document);
        extraction.unplaced = unplaced;

        for (container, anchor_title) in containers {
            let title = anchor_title.or_else(|| self.title.locate(container));
            let Some(title) = title else {
                extraction.dropped_untitled += 1;
                continue;
            };

            let record = self.build_record(title, container);
            if seen_ids.insert(record.id.clone()) {
                extraction.records.push(record);
            } else {
                extraction.duplicates += 1;
            }
        }

        debug!(
            "Extracted {} records ({} without title, {} duplicates, {} unplaced)",
            extraction.records.len(),
            extraction.dropped_untitled,
            extraction.duplicates,
            extraction.unplaced
        );
        extraction
    }

    /// Product containers with the title read from their anchor, if any,
    /// plus the number of anchors whose container was already taken.
    ///
    /// Anchors are preferred; the broad container selector is only used when
    /// the page has no anchors at all.
    fn containers<'a>(
        &self,
        document: &'a Html,
    ) -> (Vec<(ElementRef<'a>, Option<String>)>, usize) {
        let mut seen = HashSet::new();
        let anchors: Vec<ElementRef<'a>> = document.select(&self.anchor).collect();

        if !anchors.is_empty() {
            let mut unplaced = 0;
            let mut containers = Vec::with_capacity(anchors.len());
            for anchor in anchors {
                let container = self.container_of(anchor);
                if seen.insert(container.id()) {
                    containers.push((container, read(anchor, FieldSource::Text)));
                } else {
                    unplaced += 1;
                }
            }
            return (containers, unplaced);
        }

        let containers = document
            .select(&self.container)
            .filter(|container| {
                let nested = container.ancestors().any(|node| seen.contains(&node.id()));
                !nested && seen.insert(container.id())
            })
            .map(|container| (container, None))
            .collect();
        (containers, 0)
    }

    /// The product card around a title anchor.
    ///
    /// Climbs at most [`MAX_ANCESTOR_DEPTH`] levels and never past an element
    /// that holds a second anchor. An ancestor matching the container
    /// selector wins, then the nearest one holding a price, then the parent.
    fn container_of<'a>(&self, anchor: ElementRef<'a>) -> ElementRef<'a> {
        let mut first_parent = None;

        for candidate in anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(MAX_ANCESTOR_DEPTH)
        {
            if self.container.matches(&candidate) {
                return candidate;
            }
            if candidate.select(&self.anchor).nth(1).is_some() {
                break;
            }
            if candidate.select(&self.price_probe).next().is_some() {
                return candidate;
            }
            first_parent.get_or_insert(candidate);
        }

        first_parent.unwrap_or(anchor)
    }

    fn build_record(&self, title: String, container: ElementRef<'_>) -> ProductRecord {
        let locate = |locator: &Option<FieldLocator>| {
            locator.as_ref().and_then(|locator| locator.locate(container))
        };

        let mut record = ProductRecord::new(title);
        record.price = self
            .price
            .locate(container)
            .and_then(|raw| normalize_price(&raw));
        record.currency = record.price.as_deref().and_then(currency_code);
        record.seller = locate(&self.seller);
        record.rating = locate(&self.rating).and_then(|raw| parse_rating(&raw));
        record.review_count = locate(&self.review_count).and_then(|raw| parse_review_count(&raw));
        record.link = self
            .link
            .locate(container)
            .map(|href| self.site.absolutize(&href));
        record.thumbnail = self.thumbnail(container);
        record.delivery = locate(&self.delivery);
        record.refresh_id();
        record
    }

    /// Picks the best product image: inline data, then shopping thumbnails,
    /// then any non-icon http image.
    fn thumbnail(&self, container: ElementRef<'_>) -> Option<String> {
        let images: Vec<ElementRef<'_>> = container.select(&self.image).collect();
        let srcs = || images.iter().filter_map(|img| img.value().attr("src"));
        let lazy_srcs = || {
            images.iter().flat_map(|img| {
                [img.value().attr("src"), img.value().attr("data-src")]
                    .into_iter()
                    .flatten()
            })
        };

        srcs()
            .find(|src| src.starts_with("data:image/"))
            .or_else(|| {
                srcs().find(|src| src.contains("encrypted-tbn") && src.contains("shopping?q=tbn:"))
            })
            .or_else(|| lazy_srcs().find(|src| src.contains("encrypted-tbn")))
            .or_else(|| {
                srcs().find(|src| {
                    let lower = src.to_lowercase();
                    src.starts_with("http") && !["icon", "logo"].iter().any(|x| lower.contains(x))
                })
            })
            .map(|src| self.site.absolutize(src))
    }
}

/// Pulls the amount out of text like `Current price: $24.50`.
pub fn normalize_price(raw: &str) -> Option<String> {
    if let Some(found) = PRICE_RE.find(raw) {
        return Some(found.as_str().trim_end_matches(['.', ',']).trim().to_string());
    }
    raw.chars()
        .any(|c| c.is_ascii_digit())
        .then(|| raw.trim().to_string())
}

/// ISO-4217 code for the currency a price is written in
pub fn currency_code(price: &str) -> Option<String> {
    let by_symbol = [('₹', "INR"), ('€', "EUR"), ('£', "GBP"), ('¥', "JPY"), ('$', "USD")]
        .into_iter()
        .find(|(symbol, _)| price.contains(*symbol))
        .map(|(_, code)| code.to_string());

    by_symbol.or_else(|| ISO_CODE_RE.find(price).map(|m| m.as_str().to_string()))
}

/// Star rating between 0 and 5, from text like `4.5` or `Rated 4,5 out of 5`
pub fn parse_rating(raw: &str) -> Option<f32> {
    let number = NUMBER_RE.find(raw)?.as_str().replace(',', ".");
    number
        .parse::<f32>()
        .ok()
        .filter(|rating| (0.0..=5.0).contains(rating))
}

/// Review count from text like `(1,234)`, `2.3K` or `87 reviews`
pub fn parse_review_count(raw: &str) -> Option<u32> {
    let captures = COUNT_RE.captures(raw)?;
    let digits = captures.get(1)?.as_str();

    match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(suffix) => {
            let base: f64 = digits.replace(',', ".").parse().ok()?;
            let scale = if suffix == "k" { 1_000.0 } else { 1_000_000.0 };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = (base * scale).round() as u32;
            Some(count)
        }
        None => digits.replace([',', '.'], "").parse().ok(),
    }
}

/// Heuristic for the "unusual traffic" / reCAPTCHA block page
pub fn looks_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    lower.contains("recaptcha") || lower.contains("unusual traffic")
}
