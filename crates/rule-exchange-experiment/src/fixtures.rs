//! Static run fixtures: gloss options, generalization strings, distractor
//! rule descriptions, and the pilot response table.
//!
//! These are baked into a single run configuration on purpose; the study is
//! not a general experiment-authoring framework. Gloss and question text is
//! lightly marked up (`<code>`, `<i>`) for the render surface to interpret.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};

use crate::curriculum::{Polarity, RawResponseRow};

/// A rule as shown to a send-phase participant: an id plus a human-readable
/// description (possibly an intentionally misleading distractor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub id: String,
    pub description: String,
}

impl RuleDescriptor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// A candidate natural-language description of a rule. Exactly one item per
/// rule carries the correct flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossItem {
    pub gloss_id: String,
    pub gloss: String,
    #[serde(default)]
    pub correct: bool,
}

impl GlossItem {
    fn distractor(gloss_id: &str, gloss: &str) -> Self {
        Self {
            gloss_id: gloss_id.to_string(),
            gloss: gloss.to_string(),
            correct: false,
        }
    }

    fn correct(gloss_id: &str, gloss: &str) -> Self {
        Self {
            gloss_id: gloss_id.to_string(),
            gloss: gloss.to_string(),
            correct: true,
        }
    }
}

/// Forced-choice gloss options per rule.
pub fn afc_gloss_items() -> BTreeMap<String, Vec<GlossItem>> {
    let mut items = BTreeMap::new();

    items.insert(
        "3a".to_string(),
        vec![
            GlossItem::distractor(
                "a{1,}",
                "The sequence must be all <code>a</code>'s and they must be lower case",
            ),
            GlossItem::correct(
                "a{3,}",
                "The sequence must be all <code>a</code>'s, they must be lower case, and there need to be at least 3",
            ),
            GlossItem::distractor(
                "(a|A){1,}",
                "The sequence must be all <code>a</code>'s and they can be either lower case or upper case",
            ),
            GlossItem::distractor(
                "(a|A){3,}",
                "The sequence must be all <code>a</code>'s, they can be either lower case or upper case, and there at need to be at least 3",
            ),
        ],
    );

    items.insert(
        "zip-code".to_string(),
        vec![
            GlossItem::distractor("\\d+", "The sequence must be all numbers"),
            GlossItem::distractor(".{5}", "The sequence must be exactly 5 characters long"),
            GlossItem::correct(
                "\\d{5}",
                "The sequence must be all numbers and be exactly 5 characters long",
            ),
            GlossItem::distractor(
                "\\d{1,5}",
                "The sequence must be all numbers and must be between 1 and 5 characters long",
            ),
        ],
    );

    items.insert(
        "suffix-s".to_string(),
        vec![
            GlossItem::distractor(
                ".*[a-z].*",
                "The sequence must contain at least one letter (<code>a</code>, <code>b</code>, <code>c</code>, ...)",
            ),
            GlossItem::distractor(
                ".*[sS].*",
                "The sequence must contain at least one <code>s</code>, either upper or lower case",
            ),
            GlossItem::correct(
                ".*s",
                "The sequence must end in an <code>s</code> and it must be lower case",
            ),
            GlossItem::distractor(
                ".*[s|S]",
                "The sequence must end in an <code>s</code> and can be either upper or lower case",
            ),
        ],
    );

    items
}

/// Held-out strings for the (dormant) generalization sub-stage.
pub fn generalization_questions() -> BTreeMap<String, Vec<String>> {
    let mut questions = BTreeMap::new();

    questions.insert(
        "3a".to_string(),
        [
            "aaaa",
            "bbb",
            "a",
            "b93kgw;_mfo",
            "alpaca",
            "AAA",
            "aaabc",
            "DASASA",
            "aaaaaaaaaaaaaa",
            "AAAAA",
        ]
        .map(String::from)
        .to_vec(),
    );

    questions.insert(
        "zip-code".to_string(),
        [
            "31708", "56789", "236778", "-12541", "9076.2", "nfas10583vns", "238", "erqew",
            "abcde", "dskfjlmxF",
        ]
        .map(String::from)
        .to_vec(),
    );

    questions.insert(
        "delimiters".to_string(),
        [
            "xyzsf",
            "[mna_8%234]",
            "(fdfm3t)",
            "{0thg1!@}",
            "gnro[34r3]",
            "[4939k4k3",
            "[]",
            "xccg3]",
            "[fbndofb]]",
            "[[qoo_w3]",
            "[[223768]]",
        ]
        .map(String::from)
        .to_vec(),
    );

    questions.insert(
        "suffix-s".to_string(),
        [
            "ring", "breaks", "store", "past", "12berba32", "yr321a", "psss7", "35r6u",
        ]
        .map(String::from)
        .to_vec(),
    );

    questions
}

/// Misleading rule descriptions per rule family, two candidates each.
pub fn distractors() -> BTreeMap<String, Vec<RuleDescriptor>> {
    let mut pool = BTreeMap::new();

    pool.insert(
        "zip-code".to_string(),
        vec![
            RuleDescriptor::new("zip-code-1", "The sequence is exactly 5 characters long"),
            RuleDescriptor::new(
                "zip-code-2",
                "The sequence contains only numeric digits (<code>0</code>, <code>1</code>, <code>2</code>, <code>3</code>, <code>4</code>, <code>5</code>, <code>6</code>, <code>7</code>, <code>8</code>, or <code>9</code>)",
            ),
        ],
    );

    pool.insert(
        "3a".to_string(),
        vec![
            RuleDescriptor::new(
                "3a-1",
                "The sequence must be at least 6 characters long and contain <i>only</i> lowercase <code>a</code>'s (no other characters are allowed) ",
            ),
            RuleDescriptor::new(
                "3a-2",
                "The sequence contains <i>only</i> <code>a</code>'s, which can be either upper or lower case",
            ),
        ],
    );

    pool.insert(
        "suffix-s".to_string(),
        vec![
            RuleDescriptor::new(
                "suffix-s-1",
                "The sequence must contain at least one lower case <code>s</code>",
            ),
            RuleDescriptor::new(
                "suffix-s-2",
                "The sequence must contain at least one lower case letter",
            ),
        ],
    );

    pool.insert(
        "delimiters".to_string(),
        vec![
            RuleDescriptor::new(
                "delimiters-1",
                "The first character of the sequence must be <code>[</code> ",
            ),
            RuleDescriptor::new(
                "delimiters-2",
                "The last character of the sequence must be <code>]</code>",
            ),
        ],
    );

    pool
}

/// The four rule families a sender authors examples for.
pub const SENDING_FAMILIES: [&str; 4] = ["3a", "zip-code", "suffix-s", "delimiters"];

/// Sample one distractor per family and shuffle the result into the
/// send-phase input order.
pub fn sample_sending_rules(rng: &mut impl Rng) -> Vec<RuleDescriptor> {
    let pool = distractors();
    let mut rules: Vec<RuleDescriptor> = SENDING_FAMILIES
        .iter()
        .filter_map(|family| pool.get(*family).and_then(|d| d.choose(rng)).cloned())
        .collect();
    rules.shuffle(rng);
    rules
}

/// Built-in pilot response table: three contributors per rule, a short
/// labeled sequence each. Stands in for the externally supplied table when
/// no curriculum file is given.
pub fn pilot_rows() -> Vec<RawResponseRow> {
    let mut rows = Vec::new();
    let mut push = |rule: &str, teacher: &str, entries: &[(&str, Polarity)]| {
        for (i, (string, polarity)) in entries.iter().enumerate() {
            rows.push(RawResponseRow {
                example_num: i,
                polarity: *polarity,
                rule_id: rule.to_string(),
                string: (*string).to_string(),
                trial_num: 0,
                teacher_id: teacher.to_string(),
            });
        }
    };

    use Polarity::{Negative, Positive};

    push(
        "suffix-s",
        "51be3ed",
        &[
            ("cats", Positive),
            ("dogs", Positive),
            ("ring", Negative),
            ("catS", Negative),
        ],
    );
    push(
        "suffix-s",
        "13ab615",
        &[
            ("trees", Positive),
            ("runs", Positive),
            ("tree", Negative),
            ("runS", Negative),
        ],
    );
    push(
        "suffix-s",
        "66584c1",
        &[
            ("maps", Positive),
            ("map", Negative),
            ("glass", Positive),
            ("glasS", Negative),
        ],
    );

    push(
        "zip-code",
        "ecba21d",
        &[
            ("90210", Positive),
            ("12345", Positive),
            ("1234", Negative),
            ("9021o", Negative),
        ],
    );
    push(
        "zip-code",
        "51be3ed",
        &[
            ("55410", Positive),
            ("555555", Negative),
            ("02134", Positive),
            ("abcde", Negative),
        ],
    );
    push(
        "zip-code",
        "ec8b199",
        &[
            ("60614", Positive),
            ("606", Negative),
            ("73301", Positive),
            ("7330.1", Negative),
        ],
    );

    push(
        "3a",
        "6f2ca8f",
        &[
            ("aaa", Positive),
            ("aaaa", Positive),
            ("aa", Negative),
            ("AAA", Negative),
        ],
    );
    push(
        "3a",
        "f29e6ff",
        &[
            ("aaaaa", Positive),
            ("aab", Negative),
            ("aaaaaaa", Positive),
            ("a", Negative),
        ],
    );
    push(
        "3a",
        "db12c41",
        &[
            ("aaaaaa", Positive),
            ("baaa", Negative),
            ("aaa", Positive),
            ("aAa", Negative),
        ],
    );

    // present in the source table, excluded by the pilot filter
    push(
        "delimiters",
        "9f01d22",
        &[("[abc]", Positive), ("abc]", Negative)],
    );

    rows
}
