use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::screens::parse_screens;
use super::{absolutize, text_of, ExtractError};
use crate::db::{Screens, Theatre};

static BREADCRUMB: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div#breadcrumb").unwrap());
static LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("ul").unwrap());
static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static STREET: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.street-address").unwrap());
static LOCALITY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.locality").unwrap());
static POSTAL_CODE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.postal-code").unwrap());
static FACTS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div#facts").unwrap());
static FACT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.fact").unwrap());
static VCARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.vcard").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static TEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.tel").unwrap());

/// Breadcrumb trail is Home › Theaters › Country › State › Theatre.
const BREADCRUMB_NAME_INDEX: usize = 4;

pub fn parse_theatre(html: &str, origin: &str) -> Result<Theatre, ExtractError> {
    extract(&Html::parse_document(html), origin)
}

/// Build a theatre record from a detail page. Pure: the same document always
/// yields the same record.
pub fn extract(doc: &Html, origin: &str) -> Result<Theatre, ExtractError> {
    Ok(Theatre {
        name: name(doc).ok_or(ExtractError::MissingName)?,
        address: address(doc).ok_or(ExtractError::MissingAddress)?,
        zipcode: first_text(doc, &POSTAL_CODE),
        screens: screens(doc).ok_or(ExtractError::MissingScreens)?,
        website: website(doc, origin),
        phone: first_text(doc, &TEL),
    })
}

fn name(doc: &Html) -> Option<String> {
    let crumb = doc.select(&BREADCRUMB).next()?;
    let from_list = crumb.select(&LIST).next().and_then(|ul| {
        child_elements(ul, "li")
            .nth(BREADCRUMB_NAME_INDEX)
            .map(text_of)
            .filter(|n| !n.is_empty())
    });
    from_list.or_else(|| {
        crumb
            .select(&HEADING)
            .next()
            .map(text_of)
            .filter(|n| !n.is_empty())
    })
}

fn address(doc: &Html) -> Option<String> {
    let street = first_text(doc, &STREET)?;
    let mut locality = first_text(doc, &LOCALITY)?;
    // "Novi," -> "Novi"
    locality.pop();
    Some(format!("{} {}", street, locality))
}

fn screens(doc: &Html) -> Option<Screens> {
    let facts: Vec<String> = doc
        .select(&FACTS)
        .next()?
        .select(&FACT)
        .map(text_of)
        .collect();

    // Markup varies: the count sits in the second fact, or the third when the
    // second is something else (status, year).
    let text = match facts.get(1) {
        Some(second) if second.contains("screen") => second,
        _ => facts.get(2).or(facts.get(1))?,
    };
    Some(parse_screens(text))
}

fn website(doc: &Html, origin: &str) -> Option<String> {
    let vcard = doc.select(&VCARD).next()?;
    let para = child_elements(vcard, "p").next()?;
    let href = para.select(&LINK).next()?.value().attr("href")?;
    Some(absolutize(origin, href))
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector).next().map(text_of)
}

fn child_elements<'a>(
    parent: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://cinematreasures.org";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn full_detail_page() {
        let t = parse_theatre(&fixture("theatre_novi"), ORIGIN).unwrap();
        assert_eq!(t.name, "Emagine Novi");
        assert_eq!(t.address, "44425 W 12 Mile Rd Novi");
        assert_eq!(t.zipcode.as_deref(), Some("48377"));
        assert_eq!(t.screens, Screens::Count(18));
        assert_eq!(
            t.website.as_deref(),
            Some("https://www.emagine-entertainment.com/theatres/emagine-novi/")
        );
        assert_eq!(t.phone.as_deref(), Some("(248) 348-5600"));
    }

    #[test]
    fn screen_count_falls_back_to_third_fact() {
        let t = parse_theatre(&fixture("theatre_isle_royale"), ORIGIN).unwrap();
        assert_eq!(t.name, "Isle Royale");
        assert_eq!(t.screens, Screens::Count(1));
        assert_eq!(t.zipcode.as_deref(), Some("49931-1853"));
    }

    #[test]
    fn relative_website_is_made_absolute() {
        let t = parse_theatre(&fixture("theatre_isle_royale"), ORIGIN).unwrap();
        assert_eq!(
            t.website.as_deref(),
            Some("http://cinematreasures.org/theaters/4521/website")
        );
    }

    #[test]
    fn absent_optionals_are_none() {
        let t = parse_theatre(&fixture("theatre_sparse"), ORIGIN).unwrap();
        assert_eq!(t.name, "Lyric Theatre");
        assert_eq!(t.address, "112 Main St Sheridan");
        assert_eq!(t.zipcode, None);
        assert_eq!(t.website, None);
        assert_eq!(t.phone, None);
        assert_eq!(t.screens, Screens::Raw("Single screen".into()));
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = fixture("theatre_novi");
        let doc = Html::parse_document(&html);
        assert_eq!(extract(&doc, ORIGIN), extract(&doc, ORIGIN));
        assert_eq!(parse_theatre(&html, ORIGIN), parse_theatre(&html, ORIGIN));
    }

    #[test]
    fn missing_required_fields_are_typed_errors() {
        let no_crumb = r#"<div class="street-address">1 A St</div><span class="locality">X,</span>"#;
        assert_eq!(parse_theatre(no_crumb, ORIGIN), Err(ExtractError::MissingName));

        let no_address = r#"<div id="breadcrumb"><h1>Roxy</h1></div>"#;
        assert_eq!(parse_theatre(no_address, ORIGIN), Err(ExtractError::MissingAddress));

        let no_facts = r#"<div id="breadcrumb"><h1>Roxy</h1></div>
            <div class="street-address">1 A St</div><span class="locality">X,</span>"#;
        assert_eq!(parse_theatre(no_facts, ORIGIN), Err(ExtractError::MissingScreens));
    }

    #[test]
    fn empty_breadcrumb_item_falls_back_to_heading() {
        let html = r#"<div id="breadcrumb"><ul><li>Home</li><li>Theaters</li>
            <li>United States</li><li>Michigan</li><li> </li></ul><h1>Roxy</h1></div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(name(&doc).as_deref(), Some("Roxy"));

        let blank = r#"<div id="breadcrumb"><ul><li></li><li></li><li></li><li></li>
            <li></li></ul><h1></h1></div>"#;
        assert_eq!(name(&Html::parse_document(blank)), None);
    }

    #[test]
    fn website_only_from_first_paragraph() {
        let html = r#"<div class="vcard"><div><a href="/not-this">x</a></div>
            <p>no link here</p><p><a href="/nor-this">y</a></p></div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(website(&doc, ORIGIN), None);
    }
}
