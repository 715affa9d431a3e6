use catalogplane::registry::paths::{entries_for_service, partition_by_filter};
use catalogplane::registry::ConfigEntry;
use proptest::prelude::*;

proptest! {
    #[test]
    fn bucketed_iff_filter_appears_in_final_segment(
        namespace in "[a-z]{1,8}",
        service in "[a-z]{1,8}",
        leaf in "[a-z\\-]{1,16}",
        filter in "[a-z]{1,6}",
    ) {
        let entries =
            vec![ConfigEntry::new(format!("{namespace}/{service}/{leaf}"), "example.com")];
        let filters = vec![filter.clone()];
        let buckets = partition_by_filter(&entries, &filters);

        if leaf.contains(&filter) {
            prop_assert_eq!(buckets.get(&filter).map(Vec::len), Some(1));
        } else {
            prop_assert!(!buckets.contains_key(&filter));
        }
    }

    #[test]
    fn service_selection_matches_second_segment_exactly(
        services in proptest::collection::vec("[a-z]{1,8}", 1..8),
        target in "[a-z]{1,8}",
    ) {
        let entries: Vec<ConfigEntry> = services
            .iter()
            .map(|name| ConfigEntry::new(format!("ns/{name}/public"), "example.com"))
            .collect();
        let refs: Vec<&ConfigEntry> = entries.iter().collect();

        let selected = entries_for_service(&refs, &target);
        let expected = services.iter().filter(|name| *name == &target).count();
        prop_assert_eq!(selected.len(), expected);
        for entry in selected {
            prop_assert_eq!(entry.key.split('/').nth(1), Some(target.as_str()));
        }
    }

    #[test]
    fn keys_without_a_service_segment_are_never_selected(
        key in "[a-z]{1,12}",
        service in "[a-z]{1,8}",
    ) {
        let entry = ConfigEntry::new(key, "example.com");
        let refs = vec![&entry];
        prop_assert!(entries_for_service(&refs, &service).is_empty());
    }

    #[test]
    fn buckets_are_never_empty_and_members_match(
        keys in proptest::collection::vec("[a-z]{1,6}/[a-z]{1,6}/[a-z\\-]{1,12}", 0..12),
        filters in proptest::collection::vec("[a-z]{1,5}", 1..4),
    ) {
        let entries: Vec<ConfigEntry> =
            keys.iter().map(|key| ConfigEntry::new(key.clone(), "example.com")).collect();
        let buckets = partition_by_filter(&entries, &filters);

        for (filter, members) in &buckets {
            prop_assert!(!members.is_empty());
            for entry in members {
                let leaf = entry.key.split('/').next_back().unwrap_or_default();
                prop_assert!(leaf.contains(filter.as_str()));
            }
        }
    }
}
