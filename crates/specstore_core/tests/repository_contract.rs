mod common;

use common::{fields, for_each_backend, sorted_ids, user, User};
use serde_json::json;
use specstore_core::spec::{filter, filter_where, order, paginate};
use specstore_core::{ErrorKind, Filter, Money, Repository, SpecList};

#[test]
fn save_then_get_round_trips() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        let saved = repo.save(&user("u1", "alice", 250)).unwrap();

        let loaded = repo.get(&[filter("id", "u1")]).unwrap();
        assert_eq!(loaded, saved, "{backend}");
        assert_eq!(loaded.balance, Money::from_minor(250), "{backend}");
    });
}

#[test]
fn save_is_idempotent_per_identity() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "alice", 0)).unwrap();
        repo.save(&user("u1", "alice", 0)).unwrap();
        repo.save(&user("u1", "alicia", 5)).unwrap();

        assert_eq!(repo.count(&[]).unwrap(), 1, "{backend}");
        assert_eq!(
            repo.get(&[filter("id", "u1")]).unwrap().username,
            "alicia",
            "{backend}"
        );
    });
}

#[test]
fn filter_without_match_is_empty() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "alice", 0)).unwrap();

        assert!(repo.filter(&[filter("username", "nobody")]).unwrap().is_empty(), "{backend}");
        assert!(repo.filter(&[filter("id", "missing")]).unwrap().is_empty(), "{backend}");
    });
}

#[test]
fn get_requires_exactly_one_match() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "bob", 10)).unwrap();
        repo.save(&user("u2", "bob", 20)).unwrap();
        repo.save(&user("u3", "carol", 30)).unwrap();

        let missing = repo.get(&[filter("username", "dave")]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound, "{backend}");

        let many = repo.get(&[filter("username", "bob")]).unwrap_err();
        assert_eq!(many.kind(), ErrorKind::MultipleResults, "{backend}");

        let bobs = repo.filter(&[filter("username", "bob")]).unwrap();
        assert_eq!(sorted_ids(&bobs), vec!["u1", "u2"], "{backend}");

        assert_eq!(
            repo.get(&[filter("username", "carol")]).unwrap().id,
            "u3",
            "{backend}"
        );
    });
}

#[test]
fn order_and_pagination_select_a_window() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        for (id, balance) in [("u1", 40), ("u2", 10), ("u3", 30), ("u4", 20)] {
            repo.save(&user(id, "member", balance)).unwrap();
        }

        let ids = |specs: &[specstore_core::Spec]| -> Vec<String> {
            repo.filter(specs)
                .unwrap()
                .into_iter()
                .map(|user| user.id)
                .collect()
        };

        assert_eq!(ids(&[order("balance")]), vec!["u2", "u4", "u3", "u1"], "{backend}");
        assert_eq!(ids(&[order("-balance"), paginate(1, 2)]), vec!["u3", "u4"], "{backend}");
        assert_eq!(
            ids(&[order("id"), order("-id"), paginate(0, 1), paginate(0, 2)]),
            vec!["u4", "u3"],
            "{backend}"
        );
        assert_eq!(
            ids(&SpecList::new()
                .filter_where(Filter::gte("balance", 20))
                .order("balance")
                .paginate(1, 5)),
            vec!["u3", "u1"],
            "{backend}"
        );
    });
}

#[test]
fn composite_filters_agree_across_backends() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "ann", 5)).unwrap();
        repo.save(&user("u2", "bob", 15)).unwrap();
        repo.save(&user("u3", "cid", 25)).unwrap();
        repo.save(&user("u4", "dee", 35)).unwrap();

        let matching = |expression: Filter| sorted_ids(&repo.filter(&[filter_where(expression)]).unwrap());

        assert_eq!(
            matching(Filter::lt("balance", 10) | Filter::gt("balance", 30)),
            vec!["u1", "u4"],
            "{backend}"
        );
        assert_eq!(
            matching(!Filter::is_in("username", ["ann", "bob"])),
            vec!["u3", "u4"],
            "{backend}"
        );
        assert_eq!(
            matching(Filter::not_in("id", ["u1"]) & Filter::lte("balance", 25)),
            vec!["u2", "u3"],
            "{backend}"
        );
        assert_eq!(matching(Filter::ne("username", "bob")).len(), 3, "{backend}");
        assert_eq!(matching(Filter::like("email", "C%@EXAMPLE.com")), vec!["u3"], "{backend}");
        assert_eq!(
            matching(Filter::is_in("id", Vec::<String>::new())),
            Vec::<String>::new(),
            "{backend}"
        );
    });
}

#[test]
fn like_folds_only_ascii_case() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "Émile", 0)).unwrap();

        let matching =
            |pattern: &str| sorted_ids(&repo.filter(&[filter_where(Filter::like("username", pattern))]).unwrap());
        assert_eq!(matching("ÉMILE"), vec!["u1"], "{backend}");
        assert_eq!(matching("%mile"), vec!["u1"], "{backend}");
        assert!(matching("émile").is_empty(), "{backend}");
    });
}

#[test]
fn unknown_fields_are_invalid_queries() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        let err = repo.filter(&[filter("nickname", "x")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{backend}");

        let err = repo.filter(&[order("-nickname")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{backend}");
    });
}

#[test]
fn update_by_specs_without_fields_is_rejected_before_writing() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "bob", 1)).unwrap();

        let err = repo
            .update(None, &[filter("username", "bob")], &fields(&[]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{backend}");
        assert_eq!(repo.get(&[filter("id", "u1")]).unwrap(), user("u1", "bob", 1), "{backend}");
    });
}

#[test]
fn update_by_specs_assigns_every_match() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "bob", 1)).unwrap();
        repo.save(&user("u2", "bob", 2)).unwrap();
        repo.save(&user("u3", "eve", 3)).unwrap();

        repo.update(
            None,
            &[filter("username", "bob")],
            &fields(&[("balance", json!(99))]),
        )
        .unwrap();

        let rich = repo.filter(&[filter("balance", 99)]).unwrap();
        assert_eq!(sorted_ids(&rich), vec!["u1", "u2"], "{backend}");
        assert_eq!(
            repo.get(&[filter("id", "u3")]).unwrap().balance,
            Money::from_minor(3),
            "{backend}"
        );

        let err = repo
            .update(None, &[filter("username", "bob")], &fields(&[("id", json!("x"))]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{backend}");
    });
}

#[test]
fn update_by_specs_rejects_values_the_model_cannot_hold() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "bob", 1)).unwrap();
        repo.save(&user("u2", "bob", 2)).unwrap();

        for value in [json!(u64::MAX), json!(null), json!("lots")] {
            let err = repo
                .update(None, &[filter("username", "bob")], &fields(&[("balance", value)]))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{backend}");
        }

        assert_eq!(repo.get(&[filter("id", "u1")]).unwrap(), user("u1", "bob", 1), "{backend}");
        assert_eq!(repo.get(&[filter("id", "u2")]).unwrap(), user("u2", "bob", 2), "{backend}");
    });
}

#[test]
fn update_by_object_mutates_in_place_and_persists() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        let mut alice = repo.save(&user("u1", "alice", 0)).unwrap();

        repo.update(Some(&mut alice), &[], &fields(&[("balance", json!(100))]))
            .unwrap();
        assert_eq!(alice.balance, Money::from_minor(100), "{backend}");
        assert_eq!(repo.get(&[filter("id", "u1")]).unwrap(), alice, "{backend}");

        repo.update(None, &[], &fields(&[("balance", json!(5))])).unwrap();
        assert_eq!(repo.get(&[filter("id", "u1")]).unwrap(), alice, "{backend}");
    });
}

#[test]
fn delete_prefers_specs_then_object() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        let keep = repo.save(&user("u1", "ann", 1)).unwrap();
        repo.save(&user("u2", "bob", 2)).unwrap();
        repo.save(&user("u3", "bob", 3)).unwrap();

        repo.delete(Some(&keep), &[filter("username", "bob")]).unwrap();
        assert_eq!(sorted_ids(&repo.filter(&[]).unwrap()), vec!["u1"], "{backend}");

        repo.delete(None, &[]).unwrap();
        assert_eq!(repo.count(&[]).unwrap(), 1, "{backend}");

        repo.delete(Some(&keep), &[]).unwrap();
        assert_eq!(repo.count(&[]).unwrap(), 0, "{backend}");
    });
}

#[test]
fn delete_by_specs_honors_pagination() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        for (id, balance) in [("u1", 1), ("u2", 2), ("u3", 3)] {
            repo.save(&user(id, "x", balance)).unwrap();
        }
        repo.delete(None, &[order("-balance"), paginate(0, 2)]).unwrap();
        assert_eq!(sorted_ids(&repo.filter(&[]).unwrap()), vec!["u1"], "{backend}");
    });
}

#[test]
fn count_with_and_without_specs() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        assert_eq!(repo.count(&[]).unwrap(), 0, "{backend}");
        for (id, name) in [("u1", "ann"), ("u2", "bob"), ("u3", "bob")] {
            repo.save(&user(id, name, 0)).unwrap();
        }
        assert_eq!(repo.count(&[]).unwrap(), 3, "{backend}");
        assert_eq!(repo.count(&[filter("username", "bob")]).unwrap(), 2, "{backend}");
        assert_eq!(
            repo.count(&[order("id"), paginate(2, 10)]).unwrap(),
            1,
            "{backend}"
        );
    });
}

#[test]
fn save_fields_generates_an_identity() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        let created = repo
            .save_fields(fields(&[
                ("username", json!("gen")),
                ("email", json!("gen@example.com")),
                ("balance", json!(7)),
            ]))
            .unwrap();
        assert!(uuid::Uuid::parse_str(&created.id).is_ok(), "{backend}");
        assert_eq!(repo.get(&[filter("username", "gen")]).unwrap(), created, "{backend}");

        let err = repo
            .save_fields(fields(&[("username", json!(42))]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{backend}");
    });
}

#[test]
fn is_modified_and_refresh_track_stored_state() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        let stored = repo.save(&user("u1", "alice", 10)).unwrap();
        assert!(!repo.is_modified(&stored).unwrap(), "{backend}");

        let mut local = stored.clone();
        local.balance = Money::from_minor(11);
        assert!(repo.is_modified(&local).unwrap(), "{backend}");

        repo.refresh(&mut local).unwrap();
        assert_eq!(local, stored, "{backend}");

        let ghost = user("ghost", "nobody", 0);
        assert_eq!(repo.is_modified(&ghost).unwrap_err().kind(), ErrorKind::NotFound, "{backend}");
    });
}

#[test]
fn lazy_commands_cache_until_executed() {
    for_each_backend(|backend, session| {
        let repo = session.repository::<User>().unwrap();
        repo.save(&user("u1", "ann", 0)).unwrap();

        let mut total = repo.count_lazy(&[]);
        let mut everyone = repo.filter_lazy(&[order("id")]);
        let mut ann = repo.get_lazy(&[filter("id", "u1")]);
        assert!(!total.is_cached(), "{backend}");
        assert_eq!(*total.get().unwrap(), 1, "{backend}");
        assert_eq!(everyone.get().unwrap().len(), 1, "{backend}");

        repo.save(&user("u2", "bob", 0)).unwrap();
        repo.update(None, &[filter("id", "u1")], &fields(&[("balance", json!(3))]))
            .unwrap();

        assert_eq!(*total.get().unwrap(), 1, "{backend}");
        assert_eq!(everyone.get().unwrap().len(), 1, "{backend}");
        assert_eq!(*total.execute().unwrap(), 2, "{backend}");
        assert_eq!(everyone.into_result().unwrap().len(), 2, "{backend}");
        assert_eq!(ann.get().unwrap().balance, Money::from_minor(3), "{backend}");
    });
}
