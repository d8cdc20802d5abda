//! Deterministic kana → Latin transliteration.
//!
//! JP-only songs carry kana titles and readings; transliterating them lets a
//! typed English approximation ("senbonzakura") hit the right id. This is a
//! fixed rule table, not a language model: the same input always yields the
//! same output.

/// Modified-Hepburn syllable table. Two-character digraphs must come before
/// their leading character so the greedy scan picks them first.
const SYLLABLES: &[(&str, &str)] = &[
    ("きゃ", "kya"), ("きゅ", "kyu"), ("きょ", "kyo"),
    ("ぎゃ", "gya"), ("ぎゅ", "gyu"), ("ぎょ", "gyo"),
    ("しゃ", "sha"), ("しゅ", "shu"), ("しょ", "sho"),
    ("じゃ", "ja"), ("じゅ", "ju"), ("じょ", "jo"),
    ("ちゃ", "cha"), ("ちゅ", "chu"), ("ちょ", "cho"),
    ("にゃ", "nya"), ("にゅ", "nyu"), ("にょ", "nyo"),
    ("ひゃ", "hya"), ("ひゅ", "hyu"), ("ひょ", "hyo"),
    ("びゃ", "bya"), ("びゅ", "byu"), ("びょ", "byo"),
    ("ぴゃ", "pya"), ("ぴゅ", "pyu"), ("ぴょ", "pyo"),
    ("みゃ", "mya"), ("みゅ", "myu"), ("みょ", "myo"),
    ("りゃ", "rya"), ("りゅ", "ryu"), ("りょ", "ryo"),
    ("ふぁ", "fa"), ("ふぃ", "fi"), ("ふぇ", "fe"), ("ふぉ", "fo"),
    ("うぃ", "wi"), ("うぇ", "we"), ("うぉ", "wo"),
    ("ヴぁ", "va"), ("ヴぃ", "vi"), ("ヴぇ", "ve"), ("ヴぉ", "vo"),
    ("てぃ", "ti"), ("でぃ", "di"), ("とぅ", "tu"), ("どぅ", "du"),
    ("しぇ", "she"), ("じぇ", "je"), ("ちぇ", "che"),
    ("あ", "a"), ("い", "i"), ("う", "u"), ("え", "e"), ("お", "o"),
    ("か", "ka"), ("き", "ki"), ("く", "ku"), ("け", "ke"), ("こ", "ko"),
    ("が", "ga"), ("ぎ", "gi"), ("ぐ", "gu"), ("げ", "ge"), ("ご", "go"),
    ("さ", "sa"), ("し", "shi"), ("す", "su"), ("せ", "se"), ("そ", "so"),
    ("ざ", "za"), ("じ", "ji"), ("ず", "zu"), ("ぜ", "ze"), ("ぞ", "zo"),
    ("た", "ta"), ("ち", "chi"), ("つ", "tsu"), ("て", "te"), ("と", "to"),
    ("だ", "da"), ("ぢ", "ji"), ("づ", "zu"), ("で", "de"), ("ど", "do"),
    ("な", "na"), ("に", "ni"), ("ぬ", "nu"), ("ね", "ne"), ("の", "no"),
    ("は", "ha"), ("ひ", "hi"), ("ふ", "fu"), ("へ", "he"), ("ほ", "ho"),
    ("ば", "ba"), ("び", "bi"), ("ぶ", "bu"), ("べ", "be"), ("ぼ", "bo"),
    ("ぱ", "pa"), ("ぴ", "pi"), ("ぷ", "pu"), ("ぺ", "pe"), ("ぽ", "po"),
    ("ま", "ma"), ("み", "mi"), ("む", "mu"), ("め", "me"), ("も", "mo"),
    ("や", "ya"), ("ゆ", "yu"), ("よ", "yo"),
    ("ら", "ra"), ("り", "ri"), ("る", "ru"), ("れ", "re"), ("ろ", "ro"),
    ("わ", "wa"), ("を", "o"), ("ん", "n"), ("ヴ", "vu"),
    ("ぁ", "a"), ("ぃ", "i"), ("ぅ", "u"), ("ぇ", "e"), ("ぉ", "o"),
];

/// How the long-vowel mark and doubled vowels are spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanwordStyle {
    /// Double the preceding vowel: ミュージック → myuujikku.
    DoubledVowel,
    /// Drop the mark, approximating how loanwords are typed in English:
    /// ワールド → warudo.
    Preserved,
}

/// Transliterate every kana run in `text`; non-kana passes through.
pub fn romanize(text: &str, style: LoanwordStyle) -> String {
    let normalized = katakana_to_hiragana(text);
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(text.len() * 2);
    let mut pending_sokuon = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == 'っ' {
            pending_sokuon = true;
            i += 1;
            continue;
        }
        if c == 'ー' {
            if style == LoanwordStyle::DoubledVowel {
                if let Some(prev) = out.chars().last() {
                    if "aiueo".contains(prev) {
                        out.push(prev);
                    }
                }
            }
            i += 1;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let mut matched = None;
        for &(kana, romaji) in SYLLABLES {
            if rest.starts_with(kana) {
                matched = Some((kana.chars().count(), romaji));
                break;
            }
        }

        match matched {
            Some((len, romaji)) => {
                if pending_sokuon {
                    if let Some(first) = romaji.chars().next() {
                        if first != 'a' && first != 'i' && first != 'u' && first != 'e' && first != 'o'
                        {
                            out.push(first);
                        }
                    }
                    pending_sokuon = false;
                }
                out.push_str(romaji);
                i += len;
            }
            None => {
                pending_sokuon = false;
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// True when the text contains any kana worth transliterating.
pub fn contains_kana(text: &str) -> bool {
    text.chars().any(|c| {
        let code = c as u32;
        (0x3041..=0x309f).contains(&code) || (0x30a0..=0x30ff).contains(&code)
    })
}

fn katakana_to_hiragana(text: &str) -> String {
    text.chars()
        .map(|c| {
            let code = c as u32;
            // ヴ stays katakana; the table carries it directly.
            if (0x30a1..=0x30f3).contains(&code) && c != 'ヴ' {
                char::from_u32(code - 0x60).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}
