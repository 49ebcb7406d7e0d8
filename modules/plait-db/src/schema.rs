//! DDL, applied idempotently on every open. Schema history beyond what the
//! idempotent DDL can express lives in [`crate::migrations`].

pub(crate) const SCHEMA: &[&str] = &[
    // knot registrations
    r#"
    create table if not exists registrations (
        id integer primary key autoincrement,
        domain text not null unique,
        did text not null,
        secret text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        registered text
    )
    "#,
    // CI coordinators
    r#"
    create table if not exists spindles (
        id integer primary key autoincrement,
        owner text not null,
        instance text not null,
        verified text,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(owner, instance)
    )
    "#,
    r#"
    create table if not exists spindle_members (
        id integer primary key autoincrement,
        did text not null,
        rkey text not null,
        instance text not null,
        subject text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, instance, subject)
    )
    "#,
    r#"
    create table if not exists public_keys (
        id integer primary key autoincrement,
        did text not null,
        name text not null,
        key text not null,
        rkey text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, name, key)
    )
    "#,
    r#"
    create table if not exists repos (
        id integer primary key autoincrement,
        did text not null,
        name text not null,
        knot text not null,
        rkey text not null,
        at_uri text not null unique,
        description text,
        spindle text,
        source text,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, name, knot, rkey)
    )
    "#,
    r#"
    create table if not exists collaborators (
        id integer primary key autoincrement,
        did text not null,
        rkey text,
        subject_did text not null,
        repo_at text not null references repos(at_uri) on delete cascade,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    r#"
    create table if not exists follows (
        user_did text not null,
        subject_did text not null,
        rkey text not null,
        followed_at text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        primary key (user_did, subject_did),
        check (user_did <> subject_did)
    )
    "#,
    r#"
    create table if not exists stars (
        id integer primary key autoincrement,
        starred_by_did text not null,
        repo_at text not null references repos(at_uri) on delete cascade,
        rkey text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(starred_by_did, repo_at)
    )
    "#,
    r#"
    create table if not exists issues (
        id integer primary key autoincrement,
        owner_did text not null,
        repo_at text not null references repos(at_uri) on delete cascade,
        issue_id integer not null,
        title text not null,
        body text not null,
        open integer not null default 1,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        issue_at text,
        unique(repo_at, issue_id)
    )
    "#,
    r#"
    create table if not exists issue_comments (
        id integer primary key autoincrement,
        owner_did text not null,
        issue_id integer not null references issues(id) on delete cascade,
        repo_at text not null,
        comment_id integer not null,
        rkey text,
        body text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        edited text,
        deleted text,
        unique(issue_id, comment_id)
    )
    "#,
    // state: 0 closed, 1 open, 2 merged, 3 deleted
    r#"
    create table if not exists pulls (
        id integer primary key autoincrement,
        pull_id integer not null,
        repo_at text not null references repos(at_uri) on delete cascade,
        owner_did text not null,
        rkey text not null,
        title text not null,
        body text not null,
        target_branch text not null,
        state integer not null default 1,
        source_branch text,
        source_repo_at text,
        stack_id text,
        change_id text,
        parent_change_id text,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(repo_at, pull_id)
    )
    "#,
    r#"
    create table if not exists pull_submissions (
        id integer primary key autoincrement,
        pull_id integer not null references pulls(id) on delete cascade,
        round_number integer not null,
        patch text not null,
        source_rev text,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(pull_id, round_number)
    )
    "#,
    r#"
    create table if not exists pull_comments (
        id integer primary key autoincrement,
        pull_id integer not null references pulls(id) on delete cascade,
        submission_id integer not null references pull_submissions(id) on delete cascade,
        repo_at text not null,
        owner_did text not null,
        comment_at text not null,
        body text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    r#"
    create table if not exists repo_languages (
        id integer primary key autoincrement,
        repo_at text not null references repos(at_uri) on delete cascade,
        ref text not null,
        is_default_ref integer not null default 0,
        language text not null,
        bytes integer not null check (bytes >= 0),
        unique(repo_at, ref, language)
    )
    "#,
    r#"
    create table if not exists triggers (
        id integer primary key autoincrement,
        kind text not null,
        push_ref text,
        push_new_sha text check (push_new_sha is null or length(push_new_sha) = 40),
        push_old_sha text check (push_old_sha is null or length(push_old_sha) = 40),
        pr_source_branch text,
        pr_target_branch text,
        pr_source_sha text,
        pr_action text
    )
    "#,
    r#"
    create table if not exists pipelines (
        id integer primary key autoincrement,
        knot text not null,
        rkey text not null,
        repo_owner text not null,
        repo_name text not null,
        sha text not null check (length(sha) = 40),
        trigger_id integer references triggers(id),
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(knot, rkey)
    )
    "#,
    r#"
    create table if not exists pipeline_statuses (
        id integer primary key autoincrement,
        spindle text not null,
        rkey text not null,
        pipeline_knot text not null,
        pipeline_rkey text not null,
        workflow text not null,
        status text not null,
        error text,
        exit_code integer not null default 0,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(spindle, rkey),
        foreign key (pipeline_knot, pipeline_rkey)
            references pipelines(knot, rkey) on delete cascade
    )
    "#,
    r#"
    create table if not exists label_definitions (
        id integer primary key autoincrement,
        did text not null,
        rkey text not null,
        name text not null,
        value_type text not null,
        value_format text not null default 'any',
        value_enum text,
        scope text not null,
        color text,
        multiple integer not null default 0,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, rkey)
    )
    "#,
    r#"
    create table if not exists label_ops (
        id integer primary key autoincrement,
        did text not null,
        rkey text not null,
        subject text not null,
        operation text not null check (operation in ('add', 'del')),
        operand_key text not null,
        operand_value text not null,
        performed_at text,
        indexed_at text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, rkey, subject, operand_key, operand_value)
    )
    "#,
    r#"
    create table if not exists profiles (
        id integer primary key autoincrement,
        did text not null unique,
        description text not null default '',
        location text,
        include_bluesky integer not null default 0,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    r#"
    create table if not exists profile_links (
        id integer primary key autoincrement,
        did text not null references profiles(did) on delete cascade,
        url text not null,
        position integer not null check (position between 0 and 4),
        unique(did, position)
    )
    "#,
    r#"
    create table if not exists profile_stats (
        id integer primary key autoincrement,
        did text not null references profiles(did) on delete cascade,
        kind text not null check (kind in (
            'merged-pull-request-count',
            'closed-pull-request-count',
            'open-pull-request-count',
            'open-issue-count',
            'closed-issue-count',
            'repository-count'
        )),
        position integer not null check (position between 0 and 1),
        unique(did, position)
    )
    "#,
    r#"
    create table if not exists profile_pins (
        id integer primary key autoincrement,
        did text not null references profiles(did) on delete cascade,
        at_uri text not null references repos(at_uri) on delete cascade,
        position integer not null check (position between 0 and 5),
        unique(did, position)
    )
    "#,
    r#"
    create table if not exists punches (
        did text not null,
        date text not null,
        count integer not null default 0 check (count >= 0),
        primary key (did, date)
    )
    "#,
    r#"
    create table if not exists artifacts (
        id integer primary key autoincrement,
        did text not null,
        rkey text not null,
        repo_at text not null references repos(at_uri) on delete cascade,
        tag blob not null check (length(tag) = 20),
        blob_cid text not null,
        name text not null,
        size integer not null default 0 check (size >= 0),
        mimetype text not null default '*/*',
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, rkey),
        unique(repo_at, tag, name)
    )
    "#,
    r#"
    create table if not exists notifications (
        id integer primary key autoincrement,
        recipient_did text not null,
        actor_did text not null,
        type text not null,
        entity_type text not null,
        entity_id text not null,
        read integer not null default 0,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        repo_id integer references repos(id) on delete cascade,
        issue_id integer references issues(id) on delete cascade,
        pull_id integer references pulls(id) on delete cascade
    )
    "#,
    r#"
    create table if not exists notification_preferences (
        user_did text primary key,
        repo_starred integer not null default 1,
        user_followed integer not null default 1,
        issue_created integer not null default 1,
        issue_commented integer not null default 1,
        pull_created integer not null default 1,
        pull_commented integer not null default 1,
        pull_merged integer not null default 1,
        email_notifications integer not null default 0
    )
    "#,
    r#"
    create table if not exists reference_links (
        from_at text not null,
        to_at text not null,
        primary key (from_at, to_at)
    )
    "#,
    r#"
    create table if not exists oauth_requests (
        id integer primary key autoincrement,
        did text not null,
        state text not null unique,
        auth_server_iss text not null,
        pds_url text not null,
        pkce_verifier text not null,
        dpop_private_jwk text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    r#"
    create table if not exists oauth_sessions (
        id integer primary key autoincrement,
        did text not null unique,
        pds_url text not null,
        auth_server_iss text not null,
        access_token text not null,
        refresh_token text not null,
        dpop_private_jwk text not null,
        expiry text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    r#"
    create table if not exists strings (
        did text not null,
        rkey text not null,
        filename text not null,
        description text not null default '',
        content text not null,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        edited text,
        primary key (did, rkey)
    )
    "#,
    r#"
    create table if not exists emails (
        id integer primary key autoincrement,
        did text not null,
        email text not null,
        verified integer not null default 0,
        verification_code text not null,
        last_sent text,
        is_primary integer not null default 0,
        created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        unique(did, email)
    )
    "#,
    r#"
    create table if not exists repo_seqs (
        repo_at text primary key,
        next_issue_id integer not null default 1,
        next_pull_id integer not null default 1
    )
    "#,
    r#"
    create table if not exists _jetstream (
        id integer primary key check (id = 1),
        last_time_us integer not null
    )
    "#,
    r#"
    create table if not exists migrations (
        id integer primary key autoincrement,
        name text not null unique,
        applied_at text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    // hot-path indexes
    "create index if not exists idx_issues_repo on issues(repo_at)",
    "create index if not exists idx_pulls_repo on pulls(repo_at)",
    "create index if not exists idx_pulls_stack on pulls(stack_id)",
    "create index if not exists idx_stars_repo on stars(repo_at)",
    "create index if not exists idx_follows_subject on follows(subject_did)",
    "create index if not exists idx_label_ops_subject on label_ops(subject)",
    "create index if not exists idx_reference_links_to on reference_links(to_at)",
    "create index if not exists idx_notifications_recipient on notifications(recipient_did, created)",
    "create index if not exists idx_pipeline_statuses_pipeline on pipeline_statuses(pipeline_knot, pipeline_rkey)",
];
