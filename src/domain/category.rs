//! Category normalization onto stable display groups.

pub const ELECTRONICS: &str = "Electronics";
pub const FASHION: &str = "Fashion";
pub const ENTERTAINMENT: &str = "Entertainment";
pub const HOME_AND_BEAUTY: &str = "Home & Beauty";
pub const OTHER: &str = "Other";

/// Synonyms seen in the marketplace taxonomy, matched case-insensitively
/// against the whole trimmed label.
const SYNONYMS: &[(&str, &str)] = &[
    ("electronics", ELECTRONICS),
    ("electronic", ELECTRONICS),
    ("computers", ELECTRONICS),
    ("smartphones", ELECTRONICS),
    ("cameras", ELECTRONICS),
    ("audio", ELECTRONICS),
    ("家電・スマホ・カメラ", ELECTRONICS),
    ("スマホ・タブレット・パソコン", ELECTRONICS),
    ("fashion", FASHION),
    ("clothing", FASHION),
    ("apparel", FASHION),
    ("shoes", FASHION),
    ("bags", FASHION),
    ("watches", FASHION),
    ("accessories", FASHION),
    ("レディース", FASHION),
    ("メンズ", FASHION),
    ("gaming", ENTERTAINMENT),
    ("games", ENTERTAINMENT),
    ("toys", ENTERTAINMENT),
    ("collectibles", ENTERTAINMENT),
    ("trading cards", ENTERTAINMENT),
    ("books", ENTERTAINMENT),
    ("music", ENTERTAINMENT),
    ("おもちゃ・ホビー・グッズ", ENTERTAINMENT),
    ("本・音楽・ゲーム", ENTERTAINMENT),
    ("home", HOME_AND_BEAUTY),
    ("home & kitchen", HOME_AND_BEAUTY),
    ("home and kitchen", HOME_AND_BEAUTY),
    ("kitchen", HOME_AND_BEAUTY),
    ("beauty", HOME_AND_BEAUTY),
    ("cosmetics", HOME_AND_BEAUTY),
    ("インテリア・住まい・小物", HOME_AND_BEAUTY),
    ("コスメ・香水・美容", HOME_AND_BEAUTY),
];

/// Map a raw category label onto its display group.
///
/// Unknown labels are title-cased and passed through so that new source
/// categories remain visible; an empty label becomes `Other`.
pub fn normalize_category(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.eq_ignore_ascii_case("unknown") {
        return OTHER.to_string();
    }
    let lowered = collapsed.to_lowercase();
    if let Some((_, group)) = SYNONYMS.iter().find(|(synonym, _)| *synonym == lowered) {
        return (*group).to_string();
    }
    title_case(&collapsed)
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
