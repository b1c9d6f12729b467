//! Google Shopping site profile

use crate::traits::{ConsentSelectors, SiteProfile, SiteSelectors};

/// Profile for the Google Shopping results tab
pub fn profile() -> SiteProfile {
    SiteProfile {
        name: "Google Shopping".to_string(),
        base_url: "https://www.google.com".to_string(),
        search_url_pattern: "https://www.google.com/search?q={query}&tbm=shop&hl=en".to_string(),
        selectors: SiteSelectors {
            item_anchor: ".gkQHve.SsM98d.RmEs5b".to_string(),
            item_container: ".sh-dgr__grid-result, .sh-dlr__list-result, div[data-docid]"
                .to_string(),
            title: ".gkQHve, .tAxDx, .sh-dgr__title, h3".to_string(),
            price: ".lmQWe, .XrAfOe, .FG68Ac, [aria-label*='Current price']".to_string(),
            seller: Some(".WJMUdc, .aULzUe, .IuHnof".to_string()),
            rating: Some(".yi40Hd, .Rsc7Yb".to_string()),
            review_count: Some(".RDApEe, .QIrs8".to_string()),
            link: "a[href]".to_string(),
            image: "img".to_string(),
            delivery: Some(".ybnj7e, .vEjMR".to_string()),
        },
        consent: ConsentSelectors {
            url_markers: vec!["consent.google.".to_string()],
            accept_buttons: vec![
                "#L2AGLb".to_string(),
                "button[aria-label='Accept all']".to_string(),
                "form[action*='consent'] button".to_string(),
            ],
        },
    }
}
