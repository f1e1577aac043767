use crate::github::tests::test_utils::{DataModel, RecordingWrite, RepoData, TeamData};
use crate::github::{PushOptions, Stages, is_cancelled};
use team_config::RepoPermission;


fn forced(stages: Stages) -> PushOptions {
    PushOptions {
        dry_run: false,
        force: true,
        stages,
    }
}

fn only_members() -> Stages {
    Stages {
        repositories: false,
        members: true,
        teams: false,
    }
}

fn only_teams() -> Stages {
    Stages {
        repositories: false,
        members: false,
        teams: true,
    }
}

fn only_repositories() -> Stages {
    Stages {
        repositories: true,
        members: false,
        teams: false,
    }
}

#[test]
fn team_noop() {
    let model = DataModel::default();
    let gh = model.gh_model();
    let team_diff = model.diff_teams(&gh);
    assert!(team_diff.is_empty());
}

#[test]
fn team_membership_add_and_remove() {
    let mut model = DataModel::default();
    for login in ["a", "b", "c"] {
        model.create_user(login);
    }
    model.create_team(TeamData::new("eng").members(&["a", "c"]));
    let gh = model.gh_model();

    model.get_team("eng").remove_member("c");
    model.get_team("eng").add_member("b");
    let membership_diff = model.diff_team_membership(&gh);
    insta::assert_debug_snapshot!(membership_diff, @r###"
    [
        TeamMembershipChange {
            team: "eng",
            new_team: false,
            members: SetChange {
                add: [
                    "b",
                ],
                remove: [
                    "c",
                ],
            },
        },
    ]
    "###);
}

#[test]
fn team_delete_only_root() {
    let mut model = DataModel::default();
    let user = model.create_user("mark");
    model.create_team(TeamData::new("root").members(&[user.as_str()]));
    model.create_team(TeamData::new("child").parent("root").members(&[user.as_str()]));
    let gh = model.gh_model();

    model.remove_team("root");
    model.remove_team("child");
    let team_diff = model.diff_teams(&gh);
    insta::assert_debug_snapshot!(team_diff, @r###"
    TeamsChange {
        create: [],
        delete: [
            "root",
        ],
    }
    "###);
}

#[test]
fn team_create_parent_first() {
    let mut model = DataModel::default();
    let user = model.create_user("mark");
    let gh = model.gh_model();

    model.create_team(TeamData::new("a-child").parent("z-root").members(&[user.as_str()]));
    model.create_team(TeamData::new("z-root").members(&[user.as_str()]));
    let team_diff = model.diff_teams(&gh);
    insta::assert_debug_snapshot!(team_diff, @r###"
    TeamsChange {
        create: [
            "z-root",
            "a-child",
        ],
        delete: [],
    }
    "###);
}

#[test]
fn push_creates_teams_with_parent_ids() {
    let mut model = DataModel::default();
    let user = model.create_user("a");
    let gh = model.gh_model();

    model.create_team(TeamData::new("a-child").parent("z-root").members(&[user.as_str()]));
    model.create_team(TeamData::new("z-root").members(&[user.as_str()]));
    let write = RecordingWrite::default();
    let local = model
        .push(&gh, &write, forced(Stages::default()))
        .expect("Cannot push");
    insta::assert_debug_snapshot!(write.calls(), @r###"
    [
        "create_team z-root SECRET parent=None",
        "create_team a-child VISIBLE parent=Some(101)",
        "add_team_member a-child a",
        "remove_team_member a-child sync-bot",
        "add_team_member z-root a",
        "remove_team_member z-root sync-bot",
        "update_review_assignment T_new_a-child enabled=false excluded=[]",
        "update_review_assignment T_new_z-root enabled=false excluded=[]",
    ]
    "###);
    assert_eq!(local.teams["a-child"].rest_id, 102);
    assert_eq!(local.teams["z-root"].id, "T_new_z-root");
}

#[test]
fn push_dry_run_writes_nothing() {
    let mut model = DataModel::default();
    let user = model.create_user("a");
    let gh = model.gh_model();

    model.create_user("b");
    model.create_team(TeamData::new("eng").members(&[user.as_str()]));
    let write = RecordingWrite::default();
    let options = PushOptions {
        dry_run: true,
        ..PushOptions::default()
    };
    model.push(&gh, &write, options).expect("Cannot push");
    assert!(write.calls().is_empty());
}

#[test]
fn push_skips_pending_invitations() {
    let mut model = DataModel::default();
    model.create_user("a");
    let mut gh = model.gh_model();

    model.create_user("b");
    model.create_user("c");
    gh.add_account("b");
    gh.add_account("c");
    gh.add_invitation("b");
    let write = RecordingWrite::default();
    let local = model
        .push(&gh, &write, forced(only_members()))
        .expect("Cannot push");
    insta::assert_debug_snapshot!(write.calls(), @r###"
    [
        "invite_member 1002",
    ]
    "###);
    assert_eq!(local.members["c"].id, "U_c");
    assert_eq!(local.members["c"].name, "C");
    assert!(local.members["b"].id.is_empty());
}

#[test]
fn push_continues_after_a_failure() {
    let mut model = DataModel::default();
    for login in ["a", "b", "c"] {
        model.create_user(login);
    }
    model.create_team(TeamData::new("eng").members(&["a"]));
    let gh = model.gh_model();

    model.get_team("eng").add_member("b");
    model.get_team("eng").add_member("c");
    let write = RecordingWrite::default().fail_on("add_team_member eng b");
    model
        .push(&gh, &write, forced(only_teams()))
        .expect("A failed mutation must not abort the push");
    insta::assert_debug_snapshot!(write.structural_calls(), @r###"
    [
        "add_team_member eng b",
        "add_team_member eng c",
    ]
    "###);
}

#[test]
fn push_stops_when_cancelled() {
    let mut model = DataModel::default();
    for login in ["a", "b", "c"] {
        model.create_user(login);
    }
    model.create_team(TeamData::new("eng").members(&["a"]));
    let gh = model.gh_model();

    model.get_team("eng").add_member("b");
    model.get_team("eng").add_member("c");
    let write = RecordingWrite::default().cancel_on("add_team_member eng b");
    let err = model
        .push(&gh, &write, forced(only_teams()))
        .expect_err("A cancellation must abort the push");
    assert!(is_cancelled(&err));
    assert_eq!(write.calls(), vec!["add_team_member eng b".to_string()]);
}

#[test]
fn push_scrubs_removed_members() {
    let mut model = DataModel::default();
    model.create_user("a");
    model.create_user("b");
    model.create_team(TeamData::new("eng").members(&["a", "b"]));
    model.create_repo(RepoData::new("site").user("b", RepoPermission::Write));
    let gh = model.gh_model();

    model.remove_user("b");
    let write = RecordingWrite::default();
    let local = model
        .push(&gh, &write, forced(Stages::default()))
        .expect("Cannot push");
    insta::assert_debug_snapshot!(write.structural_calls(), @r###"
    [
        "remove_member b",
        "remove_team_member eng b",
        "remove_collaborator site b",
    ]
    "###);
    assert_eq!(local.teams["eng"].members, vec!["a".to_string()]);
    assert!(local.repositories["site"].grants.is_empty());
}

#[test]
fn push_deletes_root_team_and_revokes_grants() {
    let mut model = DataModel::default();
    let user = model.create_user("a");
    model.create_team(TeamData::new("root").members(&[user.as_str()]));
    model.create_team(TeamData::new("child").parent("root").members(&[user.as_str()]));
    model.create_repo(
        RepoData::new("site")
            .team("root", RepoPermission::Read)
            .team("child", RepoPermission::Write),
    );
    let gh = model.gh_model();

    model.remove_team("root");
    model.remove_team("child");
    let write = RecordingWrite::default();
    let local = model
        .push(&gh, &write, forced(Stages::default()))
        .expect("Cannot push");
    insta::assert_debug_snapshot!(write.structural_calls(), @r###"
    [
        "delete_team root",
    ]
    "###);
    assert!(local.repositories["site"].grants.is_empty());
}

#[test]
fn push_aligns_the_repository_list() {
    let mut model = DataModel::default();
    let user = model.create_user("a");
    model.create_repo(RepoData::new("remote-only").user(&user, RepoPermission::Read));
    let gh = model.gh_model();

    model.remove_repo("remote-only");
    model.create_repo(RepoData::new("local-only").user(&user, RepoPermission::Admin));
    let write = RecordingWrite::default();
    let local = model
        .push(&gh, &write, forced(only_repositories()))
        .expect("Cannot push");
    insta::assert_debug_snapshot!(local.repositories.keys().collect::<Vec<_>>(), @r###"
    [
        "remote-only",
    ]
    "###);
    assert!(write.calls().is_empty());
}

#[test]
fn push_review_assignment_skips_teams_without_id() {
    let mut model = DataModel::default();
    for login in ["a", "b"] {
        model.create_user(login);
    }
    model.create_team(
        TeamData::new("eng")
            .members(&["a"])
            .review_excluding(&["b", "ghost"]),
    );
    let gh = model.gh_model();

    model.create_team(TeamData::new("new").members(&["a"]).review_excluding(&[]));
    let write = RecordingWrite::default().fail_on("create_team new SECRET parent=None");
    model
        .push(&gh, &write, forced(Stages::default()))
        .expect("A failed team creation must not abort the push");
    let review_updates: Vec<String> = write
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("update_review_assignment"))
        .collect();
    insta::assert_debug_snapshot!(review_updates, @r###"
    [
        "update_review_assignment T_eng enabled=true excluded=[\"U_b\"]",
    ]
    "###);
}

#[test]
fn push_edits_team_settings() {
    let mut model = DataModel::default();
    let user = model.create_user("a");
    model.create_team(TeamData::new("infra").members(&[user.as_str()]));
    model.create_team(TeamData::new("eng").description("old").members(&[user.as_str()]));
    let gh = model.gh_model();

    model.get_team("eng").set_description("new");
    model.get_team("eng").set_parent(Some("infra"));
    let write = RecordingWrite::default();
    model
        .push(&gh, &write, forced(only_teams()))
        .expect("Cannot push");
    assert_eq!(
        write.structural_calls(),
        vec![
            r#"edit_team eng TeamEdit { description: Some("new"), privacy: Some(Visible), parent: Some(Set(1)) }"#
                .to_string()
        ]
    );
}

#[test]
fn push_review_assignment_excludes_mentors_and_global_list() {
    let mut model = DataModel::default();
    for login in ["a", "b", "c", "d"] {
        model.create_user(login);
    }
    model.create_team(
        TeamData::new("eng")
            .members(&["a", "b", "c", "d"])
            .mentors(&["b"])
            .review_excluding(&["c"]),
    );
    model.exclude_from_all_teams("d");
    model.exclude_from_all_teams("nobody");
    let gh = model.gh_model();

    let write = RecordingWrite::default();
    model
        .push(&gh, &write, forced(Stages::default()))
        .expect("Cannot push");
    assert_eq!(
        write.calls(),
        vec![r#"update_review_assignment T_eng enabled=true excluded=["U_b", "U_c", "U_d"]"#.to_string()]
    );
}

#[test]
fn repository_permission_change() {
    let mut model = DataModel::default();
    let user = model.create_user("a");
    model.create_team(TeamData::new("eng").members(&[user.as_str()]));
    model.create_repo(
        RepoData::new("site")
            .team("eng", RepoPermission::Write)
            .user("a", RepoPermission::Read),
    );
    let gh = model.gh_model();

    model.get_repo("site").set_team("eng", RepoPermission::Admin);
    model.get_repo("site").remove_user("a");
    let repo_diff = model.diff_repository_permissions(&gh);
    insta::assert_debug_snapshot!(repo_diff, @r###"
    [
        RepositoryPermissionChange {
            repository: "site",
            teams: SetChange {
                add: [
                    (
                        "eng",
                        Admin,
                    ),
                ],
                remove: [
                    (
                        "eng",
                        Write,
                    ),
                ],
            },
            users: SetChange {
                add: [],
                remove: [
                    (
                        "a",
                        Read,
                    ),
                ],
            },
        },
    ]
    "###);

    let write = RecordingWrite::default();
    model
        .push(&gh, &write, forced(only_repositories()))
        .expect("Cannot push");
    insta::assert_debug_snapshot!(write.calls(), @r###"
    [
        "set_team_repo_permission site eng ADMIN",
        "remove_collaborator site a",
    ]
    "###);
}

#[test]
fn pull_follows_nested_pages() {
    let mut model = DataModel::default();
    let logins = ["a", "b", "c", "d", "e"];
    for login in logins {
        model.create_user(login);
    }
    model.create_team(TeamData::new("eng").members(&logins));
    model.create_team(TeamData::new("ops").members(&["a"]));
    model.create_team(TeamData::new("web").parent("eng").members(&["b", "c"]));
    let mut gh = model.gh_model();
    gh.set_page_size(1);

    let remote = model.pull(&gh);
    assert_eq!(remote.members.len(), 5);
    assert_eq!(remote.teams.len(), 3);
    assert_eq!(remote.teams["eng"].members, logins.map(String::from).to_vec());
    assert_eq!(remote.teams["web"].members, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(remote.teams["web"].parent.as_deref(), Some("eng"));
}
