//! Resolution behavior over a fixture snapshot.
//!
//! These tests build the index snapshot directly from typed records, without
//! stores or network seams, to pin down the resolution order, the fuzzy
//! floors and the leak invariant.

use pjsk_core::config::FuzzyPolicy;
use pjsk_core::index::{build_snapshot, RegionTables};
use pjsk_core::leak::LeakGuard;
use pjsk_core::master::parse_rows;
use pjsk_core::region::Region;
use serde_json::{json, Value};

const NOW_MS: i64 = 1_000_000;

fn tables(
    region: Region,
    musics: Vec<Value>,
    difficulties: Vec<Value>,
    cards: Vec<Value>,
    characters: Vec<Value>,
    events: Vec<Value>,
) -> RegionTables {
    RegionTables {
        region,
        musics: parse_rows(region, "musics", &musics),
        difficulties: parse_rows(region, "musicDifficulties", &difficulties),
        cards: parse_rows(region, "cards", &cards),
        characters: parse_rows(region, "gameCharacters", &characters),
        events: parse_rows(region, "events", &events),
    }
}

fn music(id: u32, title: &str, published_at: i64) -> Value {
    json!({"id": id, "title": title, "publishedAt": published_at})
}

fn policy() -> FuzzyPolicy {
    FuzzyPolicy::default()
}

mod fuzzy_floor_tests {
    use super::*;

    /// One four-character title so normalized scores are exact quarters.
    fn snapshot() -> pjsk_core::IndexSnapshot {
        let jp = tables(
            Region::Jp,
            vec![music(1, "abcd", 10)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS)
    }

    #[test]
    fn test_score_exactly_at_floor_resolves() {
        // distance 2 over length 4: score 0.5, exactly the default floor.
        let snapshot = snapshot();
        assert_eq!(snapshot.resolve_song("abxy", &policy()).unwrap().id, 1);
    }

    #[test]
    fn test_score_below_floor_does_not_resolve() {
        // distance 3 over length 4: score 0.25.
        let snapshot = snapshot();
        assert!(snapshot.resolve_song("axyz", &policy()).is_none());
    }

    #[test]
    fn test_floor_is_policy_not_constant() {
        let mut strict = policy();
        strict.song_floor = 0.75;
        let snapshot = snapshot();
        // 0.5 passes the default floor but not the stricter one.
        assert!(snapshot.resolve_song("abxy", &strict).is_none());
        assert_eq!(snapshot.resolve_song("abxd", &strict).unwrap().id, 1);
    }

    #[test]
    fn test_higher_score_wins() {
        let jp = tables(
            Region::Jp,
            vec![music(1, "abcdefgh", 10), music(2, "abcdxxxx", 20)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        // "abcdefgx" is distance 1 from title 1 (0.875) and distance 4 from
        // title 2 (0.5): both above floor, higher score must win.
        assert_eq!(snapshot.resolve_song("abcdefgx", &policy()).unwrap().id, 1);
    }

    #[test]
    fn test_equal_score_ties_break_first_seen() {
        let jp = tables(
            Region::Jp,
            vec![music(1, "aaaa", 10), music(2, "aaab", 20)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        // "aaac" is distance 1 from both titles; insertion order decides.
        assert_eq!(snapshot.resolve_song("aaac", &policy()).unwrap().id, 1);
    }
}

mod resolution_order_tests {
    use super::*;

    #[test]
    fn test_numeric_query_is_id_lookup() {
        let jp = tables(
            Region::Jp,
            vec![music(25, "Melt", 10)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        assert_eq!(snapshot.resolve_song("25", &policy()).unwrap().id, 25);
    }

    #[test]
    fn test_ambiguous_numeric_alias_prefers_title() {
        // A song literally titled "39" and an unrelated song with id 39.
        let jp = tables(
            Region::Jp,
            vec![music(39, "Unrelated", 10), music(100, "39", 20)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        assert_eq!(snapshot.resolve_song("39", &policy()).unwrap().id, 100);
    }

    #[test]
    fn test_exact_title_beats_fuzzy() {
        let jp = tables(
            Region::Jp,
            vec![music(1, "melt", 10), music(2, "melty", 20)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        assert_eq!(snapshot.resolve_song("MELT", &policy()).unwrap().id, 1);
    }

    #[test]
    fn test_kana_query_resolves_via_romanization() {
        let jp = tables(
            Region::Jp,
            vec![json!({
                "id": 7,
                "title": "千本桜",
                "pronunciation": "せんぼんざくら",
                "publishedAt": 10
            })],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        // Latin query hits the romanized pronunciation variant.
        assert_eq!(
            snapshot.resolve_song("senbonzakura", &policy()).unwrap().id,
            7
        );
        // A kana query gets romanized and retried against the same variant.
        assert_eq!(
            snapshot
                .resolve_song("せんぼんざくら", &policy())
                .unwrap()
                .id,
            7
        );
    }

    #[test]
    fn test_character_resolution_uses_higher_floor() {
        let jp = tables(
            Region::Jp,
            vec![],
            vec![],
            vec![],
            vec![json!({"id": 21, "firstName": "Hatsune", "givenName": "Miku"})],
            vec![],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        assert_eq!(
            snapshot
                .resolve_character("hatsune miku", &policy())
                .unwrap()
                .id,
            21
        );
        // One typo over a long name passes 0.65; a vaguely similar string
        // does not.
        assert!(snapshot
            .resolve_character("hatsune mika", &policy())
            .is_some());
        assert!(snapshot.resolve_character("hats", &policy()).is_none());
    }

    #[test]
    fn test_event_resolution_by_short_code_and_id() {
        let jp = tables(
            Region::Jp,
            vec![],
            vec![],
            vec![],
            vec![],
            vec![json!({
                "id": 88,
                "name": "Walk on and on",
                "eventType": "marathon",
                "assetBundleName": "event_whip_2021",
                "startAt": 100,
                "aggregateAt": 900,
                "closedAt": 1000
            })],
        );
        let snapshot = build_snapshot(vec![jp], &LeakGuard::default(), None, NOW_MS);
        assert_eq!(snapshot.resolve_event("walk on and on", &policy()).unwrap().id, 88);
        assert_eq!(snapshot.resolve_event("whip_2021", &policy()).unwrap().id, 88);
        assert_eq!(snapshot.resolve_event("88", &policy()).unwrap().id, 88);
        // Substring match through the Skim pass.
        assert_eq!(snapshot.resolve_event("walk on", &policy()).unwrap().id, 88);
    }
}

mod leak_invariant_tests {
    use super::*;

    fn leaky_snapshot(leak: &LeakGuard) -> pjsk_core::IndexSnapshot {
        let jp = tables(
            Region::Jp,
            vec![
                music(1, "public song", 10),
                // JP-only, future release: leaked.
                music(2, "secret song", NOW_MS + 10_000),
            ],
            vec![],
            vec![json!({
                "id": 500,
                "characterId": 21,
                "cardRarityType": "rarity_4",
                "attr": "cute",
                "prefix": "Unannounced",
                "assetBundleName": "res500",
                "releaseAt": NOW_MS + 10_000
            })],
            vec![json!({"id": 21, "firstName": "Hatsune", "givenName": "Miku"})],
            vec![json!({
                "id": 9,
                "name": "Future Event",
                "eventType": "marathon",
                "assetBundleName": "event_future",
                "startAt": NOW_MS + 10_000,
                "aggregateAt": NOW_MS + 20_000,
                "closedAt": NOW_MS + 30_000
            })],
        );
        build_snapshot(vec![jp], leak, None, NOW_MS)
    }

    #[test]
    fn test_leaked_entities_never_resolve() {
        let snapshot = leaky_snapshot(&LeakGuard::default());

        // By exact title, by id, by fuzzy: all misses.
        assert!(snapshot.resolve_song("secret song", &policy()).is_none());
        assert!(snapshot.resolve_song("2", &policy()).is_none());
        assert!(snapshot.resolve_song("secret sonh", &policy()).is_none());

        assert!(snapshot.resolve_event("future event", &policy()).is_none());
        assert!(snapshot.resolve_event("future", &policy()).is_none());
        assert!(snapshot.resolve_event("9", &policy()).is_none());

        assert!(snapshot
            .lookup_card("★★★★ [cute] Hatsune Miku - Unannounced")
            .is_none());
    }

    #[test]
    fn test_leaked_entities_stay_queryable_by_id() {
        let snapshot = leaky_snapshot(&LeakGuard::default());
        // The entities exist in the id maps for the leak predicates.
        assert!(snapshot.song(2).is_some());
        assert!(snapshot.event(9).is_some());
        assert!(snapshot.card(500).is_some());
    }

    #[test]
    fn test_allow_list_restores_resolution() {
        let allow = pjsk_core::LeakAllowList {
            songs: vec![2],
            ..Default::default()
        };
        let snapshot = leaky_snapshot(&LeakGuard::new(&allow));
        assert_eq!(snapshot.resolve_song("secret song", &policy()).unwrap().id, 2);
    }

    #[test]
    fn test_public_entities_unaffected() {
        let snapshot = leaky_snapshot(&LeakGuard::default());
        assert_eq!(snapshot.resolve_song("public song", &policy()).unwrap().id, 1);
    }
}

mod card_name_tests {
    use super::*;

    #[test]
    fn test_en_jp_spelling_takes_priority() {
        let card = |title: &str| {
            json!({
                "id": 300,
                "characterId": 21,
                "cardRarityType": "rarity_3",
                "attr": "cool",
                "prefix": title,
                "assetBundleName": "res300",
                "releaseAt": 10
            })
        };
        let character = json!({"id": 21, "firstName": "Hatsune", "givenName": "Miku"});
        let tw = tables(
            Region::Tw,
            vec![],
            vec![],
            vec![card("霓虹")],
            vec![character.clone()],
            vec![],
        );
        let en = tables(
            Region::En,
            vec![],
            vec![],
            vec![card("Neon Glow")],
            vec![character],
            vec![],
        );
        // TW comes first in the merge; the EN spelling must still win in the
        // priority map while the TW one stays reachable.
        let snapshot = build_snapshot(vec![tw, en], &LeakGuard::default(), None, NOW_MS);
        assert_eq!(
            snapshot
                .lookup_card("★★★ [cool] Hatsune Miku - Neon Glow")
                .unwrap()
                .id,
            300
        );
        assert_eq!(
            snapshot
                .lookup_card("★★★ [cool] Hatsune Miku - 霓虹")
                .unwrap()
                .id,
            300
        );
    }
}
