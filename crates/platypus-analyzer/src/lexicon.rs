//! Per-language word tables driving the grammar.
//!
//! - question words: expected answer type, properties that relate a found
//!   thing to the asked one (`where` → `place`), and patterns turning a
//!   predicate label into a property name (`{} place`)
//! - case words: prepositions and the label patterns they select, with the
//!   orientation of the resulting relation
//! - meaningless roots: heads that only wrap the real question ("give me")
//! - nominalizations: participles whose relation is named by a noun
//!   ("born" → "birth")

use platypus_formula::{CompareOp, ValueKind};

// ============================================================================
// Question words
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionWord {
    pub words: &'static str,
    /// Type of the answer, when the question word implies one.
    pub expected_kind: Option<ValueKind>,
    pub expected_properties: &'static [&'static str],
    /// `{}` is replaced by the predicate label.
    pub property_modifiers: &'static [&'static str],
}

impl QuestionWord {
    const fn plain(words: &'static str) -> Self {
        Self {
            words,
            expected_kind: None,
            expected_properties: &[],
            property_modifiers: &[],
        }
    }

    const fn properties(
        words: &'static str,
        expected_properties: &'static [&'static str],
        property_modifiers: &'static [&'static str],
    ) -> Self {
        Self {
            words,
            expected_kind: None,
            expected_properties,
            property_modifiers,
        }
    }

    const fn temporal(
        words: &'static str,
        expected_properties: &'static [&'static str],
        property_modifiers: &'static [&'static str],
    ) -> Self {
        Self {
            words,
            expected_kind: Some(ValueKind::Temporal),
            expected_properties,
            property_modifiers,
        }
    }

    pub fn has_properties(&self) -> bool {
        !self.expected_properties.is_empty()
    }
}

const EN_WHERE_PROPERTIES: &[&str] = &["location", "place", "city", "locality"];
const EN_WHERE_MODIFIERS: &[&str] = &["{} place", "{} location", "{} city"];
const EN_AMOUNT: &[&str] = &["amount", "quantity", "number"];
const EN_AMOUNT_MODIFIERS: &[&str] = &["{} amount", "{} quantity", "{} number"];

const EN_QUESTION_WORDS: &[QuestionWord] = &[
    QuestionWord::plain("give"),
    QuestionWord::plain("give me"),
    QuestionWord::plain("give us"),
    QuestionWord::plain("list"),
    QuestionWord::plain("what"),
    QuestionWord::plain("what kind"),
    QuestionWord::properties("what type", &["type", "sort"], &[]),
    QuestionWord::properties("what sort", &["type", "sort"], &[]),
    QuestionWord::properties("what time", &["time"], &["{} time"]),
    QuestionWord::temporal("when", &["date", "time"], &["{} date", "{} time"]),
    QuestionWord::properties(
        "why",
        &["reason", "cause", "origin"],
        &["{} reason", "{} cause", "{} origin"],
    ),
    QuestionWord::properties("where", EN_WHERE_PROPERTIES, EN_WHERE_MODIFIERS),
    QuestionWord::plain("who"),
    QuestionWord::properties("how", &["manner"], &["{} manner"]),
    QuestionWord::properties("how much", EN_AMOUNT, EN_AMOUNT_MODIFIERS),
    QuestionWord::properties("how many", EN_AMOUNT, EN_AMOUNT_MODIFIERS),
    QuestionWord::properties("how old", &["age"], &["{} age"]),
    QuestionWord::properties("how far", &["distance"], &["{} distance"]),
    QuestionWord::properties("how long", &["length", "duration"], &["{} length", "{} duration"]),
    QuestionWord::properties("how tall", &["height"], &["{} height"]),
    QuestionWord::properties("how deep", &["depth"], &["{} depth"]),
    QuestionWord::properties("how wide", &["width"], &["{} width"]),
    QuestionWord::properties("how big", &["size"], &["{} size"]),
    QuestionWord::properties("how fast", &["speed", "velocity"], &["{} speed", "{} velocity"]),
    QuestionWord::properties("how often", &["frequency"], &["{} frequency"]),
    QuestionWord::properties("how come", &["reason"], &["{} reason"]),
    QuestionWord::plain("which"),
    QuestionWord::plain("whom"),
    QuestionWord::properties("whose", &["owner"], &["{} owner"]),
    QuestionWord::plain("of which"),
    QuestionWord::properties("in which", EN_WHERE_PROPERTIES, EN_WHERE_MODIFIERS),
    QuestionWord::properties(
        "from which",
        &[
            "place",
            "location",
            "residence",
            "origin",
            "citizenship",
            "nationality",
            "country of citizenship",
            "country",
            "city",
        ],
        &[],
    ),
];

const FR_OU: QuestionWord =
    QuestionWord::properties("où", &["localisation", "lieu"], &["lieu de {}"]);
const FR_QUAND: QuestionWord = QuestionWord::temporal(
    "quand",
    &["date", "heure"],
    &["date de {}", "heure de {}", "année de {}"],
);

const FR_QUESTION_WORDS: &[QuestionWord] = &[
    QuestionWord::plain("a quoi"),
    QuestionWord::plain("à quoi"),
    QuestionWord {
        words: "comment",
        expected_kind: None,
        expected_properties: &[],
        property_modifiers: &[
            "circonstance de {}",
            "circonstance du {}",
            "cause de {}",
            "cause {}",
            "{} car",
            "{} à cause de",
        ],
    },
    QuestionWord::plain("combien"),
    QuestionWord::plain("de quoi"),
    QuestionWord::plain("donne"),
    QuestionWord::plain("donne moi"),
    QuestionWord::plain("donne nous"),
    QuestionWord::plain("laquelle"),
    QuestionWord::plain("lesquelles"),
    QuestionWord::plain("lequel"),
    QuestionWord::plain("lesquels"),
    QuestionWord::plain("liste"),
    QuestionWord { words: "ou", ..FR_OU },
    FR_OU,
    QuestionWord::properties("pourquoi", &["raison", "cause", "origine"], &[]),
    QuestionWord::plain("qu'"),
    FR_QUAND,
    QuestionWord { words: "quant", ..FR_QUAND },
    QuestionWord::plain("que"),
    QuestionWord::plain("quel"),
    QuestionWord::plain("quelle"),
    QuestionWord::plain("quelles"),
    QuestionWord::plain("quels"),
    QuestionWord::plain("qui"),
    QuestionWord::plain("quoi"),
];

const DE_QUESTION_WORDS: &[QuestionWord] = &[
    QuestionWord::plain("wer"),
    QuestionWord::plain("was"),
    QuestionWord::temporal("wann", &["datum", "stunde"], &["{}datum"]),
    QuestionWord::properties("wo", &["lage", "ort", "platz"], &["{}ort"]),
    QuestionWord::plain("wen"),
    QuestionWord::plain("wem"),
    QuestionWord::plain("wieso"),
    QuestionWord::properties("woher", &["start"], &[]),
    QuestionWord::properties("warum", &["ursache", "anlass", "grund", "anfang"], &[]),
    QuestionWord::plain("welch"),
];

const ES_DONDE: QuestionWord = QuestionWord::properties(
    "dónde",
    &[
        "localización",
        "lugar",
        "sitio",
        "plaza",
        "posición",
        "ubicación",
        "coordenadas",
        "país",
    ],
    &["lugar de {}"],
);
const ES_CUANDO: QuestionWord = QuestionWord::temporal(
    "cuándo",
    &["fecha", "hora"],
    &["fecha de {}", "hora de {}", "año de {}"],
);
const ES_POR_QUE: QuestionWord = QuestionWord::properties("por qué", &["causa", "razón"], &[]);

const ES_QUESTION_WORDS: &[QuestionWord] = &[
    QuestionWord::plain("cómo"),
    QuestionWord::plain("como"),
    QuestionWord::plain("cuál"),
    QuestionWord::plain("cual"),
    QuestionWord::plain("cuáles"),
    QuestionWord::plain("cuales"),
    ES_CUANDO,
    QuestionWord { words: "cuando", ..ES_CUANDO },
    QuestionWord::plain("cuánto"),
    QuestionWord::plain("cuanto"),
    QuestionWord::plain("cuánta"),
    QuestionWord::plain("cuanta"),
    QuestionWord::plain("cuántos"),
    QuestionWord::plain("cuantos"),
    QuestionWord::plain("cuántas"),
    QuestionWord::plain("cuantas"),
    ES_DONDE,
    QuestionWord { words: "donde", ..ES_DONDE },
    ES_POR_QUE,
    QuestionWord { words: "por que", ..ES_POR_QUE },
    QuestionWord::plain("qué"),
    QuestionWord::plain("que"),
    QuestionWord::plain("quién"),
    QuestionWord::plain("quien"),
    QuestionWord::plain("quiénes"),
    QuestionWord::plain("quienes"),
];

// ============================================================================
// Case words
// ============================================================================

/// How a relation found through a case word attaches its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CaseTerm {
    /// `rel(arg, ?x)`: "capital of France".
    Subject,
    /// `rel(?x, arg)`: "written by Hugo".
    Object,
    /// `∃v. rel(?x, v) ∧ v op arg`: "born before 1950".
    Compare(CompareOp),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseWord {
    pub words: &'static str,
    /// Label patterns (`{}` is the predicate label) and the term they build.
    pub terms: &'static [(&'static str, CaseTerm)],
}

const fn case(words: &'static str, terms: &'static [(&'static str, CaseTerm)]) -> CaseWord {
    CaseWord { words, terms }
}

const OF_LIKE_FR: &[(&str, CaseTerm)] = &[("{} de", CaseTerm::Object), ("{}", CaseTerm::Subject)];

const EN_CASE_WORDS: &[CaseWord] = &[
    case(
        "after",
        &[
            ("{} after", CaseTerm::Object),
            ("{} in", CaseTerm::Compare(CompareOp::Gt)),
        ],
    ),
    case(
        "before",
        &[
            ("{} before", CaseTerm::Object),
            ("{} in", CaseTerm::Compare(CompareOp::Lt)),
        ],
    ),
    case("by", &[("{} by", CaseTerm::Object)]),
    case("for", &[("{} for", CaseTerm::Object)]),
    case("from", &[("{} from", CaseTerm::Object)]),
    case("in", &[("{} in", CaseTerm::Object)]),
    case("of", &[("{} of", CaseTerm::Object), ("{}", CaseTerm::Subject)]),
    case("on", &[("{} on", CaseTerm::Object)]),
];

const FR_CASE_WORDS: &[CaseWord] = &[
    case("à", &[("{} à", CaseTerm::Object)]),
    case("à partir de", &[("{} à partir de", CaseTerm::Object)]),
    case("à cause de", &[("{} à cause de", CaseTerm::Object)]),
    case(
        "après",
        &[
            ("{} après", CaseTerm::Object),
            ("{} en", CaseTerm::Compare(CompareOp::Gt)),
        ],
    ),
    case(
        "avant",
        &[
            ("{} avant", CaseTerm::Object),
            ("{} en", CaseTerm::Compare(CompareOp::Lt)),
        ],
    ),
    case("avec", &[("{} avec", CaseTerm::Object)]),
    case("chez", &[("{} chez", CaseTerm::Object)]),
    case("contre", &[("{} contre", CaseTerm::Object)]),
    case("d'", OF_LIKE_FR),
    case("d’", OF_LIKE_FR),
    case("dans", &[("{} dans", CaseTerm::Object)]),
    case("de", OF_LIKE_FR),
    case("depuis", &[("{} depuis", CaseTerm::Object)]),
    case("derrière", &[("{} derrière", CaseTerm::Object)]),
    case("des", OF_LIKE_FR),
    case("devant", &[("{} devant", CaseTerm::Object)]),
    case("du", OF_LIKE_FR),
    case("en", &[("{} en", CaseTerm::Object)]),
    case("envers", &[("{} envers", CaseTerm::Object)]),
    case("jusqu'à", &[("{} jusqu'à", CaseTerm::Object)]),
    case("jusqu’à", &[("{} jusqu'à", CaseTerm::Object)]),
    case("malgré", &[("{} malgré", CaseTerm::Object)]),
    case("pendant", &[("{} pendant", CaseTerm::Object)]),
    case("par", &[("{} par", CaseTerm::Object)]),
    case("pour", &[("{} pour", CaseTerm::Object)]),
    case("sans", &[("{} sans", CaseTerm::Object)]),
    case("sauf", &[("{} sauf", CaseTerm::Object)]),
    case("selon", &[("{} selon", CaseTerm::Object)]),
    case("sous", &[("{} sous", CaseTerm::Object)]),
    case("sur", &[("{} sur", CaseTerm::Object)]),
    case("vers", &[("{} vers", CaseTerm::Object)]),
];

// ============================================================================
// Roots and nominalizations
// ============================================================================

const EN_MEANINGLESS: &[&str] = &[
    "list", "is", "are", "was", "were", "who", "what", "give", "me", "us",
];
const FR_MEANINGLESS: &[&str] = &[
    "liste", "donne", "retourne", "dit", "explique", "moi", "nous", "a", "ont", "avait",
    "avaient", "-ce", "qu'", "qui", "quel", "quels", "quelle", "quelles", "est", "sont",
];
const ES_MEANINGLESS: &[&str] = &[
    "dame", "danos", "daños", "lista", "está", "esta", "es", "eres", "eras", "son", "quien",
    "qué", "dar", "me", "mí",
];

const EN_NOMINALIZATIONS: &[(&[&str], &str)] = &[
    (&["born"], "birth"),
    (&["died", "dead"], "death"),
    (&["married"], "spouse"),
];
const FR_NOMINALIZATIONS: &[(&[&str], &str)] = &[
    (&["né", "née", "nés", "nées"], "naissance"),
    (&["mort", "morte", "morts", "mortes"], "décès"),
    (&["décédé", "décédée", "décédés", "décédées"], "décès"),
];
const ES_NOMINALIZATIONS: &[(&[&str], &str)] = &[
    (&["nació", "nacido", "nacida"], "nacimiento"),
    (&["murió", "muerto", "muerta"], "muerte"),
];
const DE_NOMINALIZATIONS: &[(&[&str], &str)] = &[
    (&["geboren"], "geburt"),
    (&["gestorben"], "tod"),
];

// ============================================================================
// Lexicon
// ============================================================================

/// Word tables of one language.
#[derive(Debug)]
pub struct Lexicon {
    pub language: &'static str,
    question_words: &'static [QuestionWord],
    case_words: &'static [CaseWord],
    meaningless_roots: &'static [&'static str],
    nominalizations: &'static [(&'static [&'static str], &'static str)],
}

static LEXICONS: &[Lexicon] = &[
    Lexicon {
        language: "en",
        question_words: EN_QUESTION_WORDS,
        case_words: EN_CASE_WORDS,
        meaningless_roots: EN_MEANINGLESS,
        nominalizations: EN_NOMINALIZATIONS,
    },
    Lexicon {
        language: "fr",
        question_words: FR_QUESTION_WORDS,
        case_words: FR_CASE_WORDS,
        meaningless_roots: FR_MEANINGLESS,
        nominalizations: FR_NOMINALIZATIONS,
    },
    Lexicon {
        language: "de",
        question_words: DE_QUESTION_WORDS,
        case_words: &[],
        meaningless_roots: &[],
        nominalizations: DE_NOMINALIZATIONS,
    },
    Lexicon {
        language: "es",
        question_words: ES_QUESTION_WORDS,
        case_words: &[],
        meaningless_roots: ES_MEANINGLESS,
        nominalizations: ES_NOMINALIZATIONS,
    },
];

fn normalize(words: &str) -> String {
    words
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Lexicon {
    pub fn for_language(language: &str) -> Option<&'static Lexicon> {
        LEXICONS.iter().find(|l| l.language == language)
    }

    pub fn languages() -> impl Iterator<Item = &'static str> {
        LEXICONS.iter().map(|l| l.language)
    }

    pub fn question_word(&self, words: &str) -> Option<&'static QuestionWord> {
        let words = normalize(words);
        self.question_words.iter().find(|q| q.words == words)
    }

    pub fn case_word(&self, words: &str) -> Option<&'static CaseWord> {
        let words = normalize(words);
        self.case_words.iter().find(|c| c.words == words)
    }

    pub fn is_meaningless_root(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        self.meaningless_roots.contains(&word.as_str())
    }

    pub fn nominalization(&self, word: &str) -> Option<&'static str> {
        let word = word.to_lowercase();
        self.nominalizations
            .iter()
            .find(|(forms, _)| forms.contains(&word.as_str()))
            .map(|(_, noun)| *noun)
    }

    /// Single-token question words having expected properties.
    pub fn property_question_words(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.question_words
            .iter()
            .filter(|q| q.has_properties() && !q.words.contains(' '))
            .map(|q| q.words)
    }
}

/// Guess the language of a question from its leading question words.
///
/// The first one or two words are looked up in every lexicon; words that
/// are question words in several languages (`que`) do not decide.
pub fn guess_language(question: &str) -> Option<&'static str> {
    let words: Vec<String> = question
        .split(|c: char| c.is_whitespace() || c == '?' || c == '¿' || c == ',')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .take(2)
        .collect();
    let mut candidates = words.clone();
    if words.len() == 2 {
        candidates.insert(0, words.join(" "));
    }
    for candidate in candidates {
        let matching: Vec<&'static str> = LEXICONS
            .iter()
            .filter(|l| l.question_word(&candidate).is_some())
            .map(|l| l.language)
            .collect();
        if matching.len() == 1 {
            return Some(matching[0]);
        }
    }
    None
}
