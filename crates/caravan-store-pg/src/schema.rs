//! Game database schema.

/// SQL to create the teams table.
pub const CREATE_TEAMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS teams (
    id        BIGSERIAL PRIMARY KEY,
    name      VARCHAR(255) NOT NULL,
    game_vars JSONB NOT NULL DEFAULT '{}'
);
";

/// SQL to create the team members table.
pub const CREATE_TEAM_MEMBERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS team_members (
    team_id   BIGINT NOT NULL REFERENCES teams (id),
    user_id   BIGINT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    PRIMARY KEY (team_id, user_id)
);
";

/// SQL to create the scenarios table.
pub const CREATE_SCENARIOS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS scenarios (
    id        BIGSERIAL PRIMARY KEY,
    name      VARCHAR(255) NOT NULL,
    script    VARCHAR(255) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);
";

/// SQL to create the scripts table. Scripts are addressed by opaque
/// name, never by filesystem path.
pub const CREATE_SCRIPTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS scripts (
    name VARCHAR(255) PRIMARY KEY,
    yaml TEXT NOT NULL
);
";

/// SQL to create the games table. The partial unique index enforces at
/// most one active game per team; a double-start race surfaces as a
/// unique violation on insert.
pub const CREATE_GAMES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS games (
    id                BIGSERIAL PRIMARY KEY,
    team_id           BIGINT NOT NULL REFERENCES teams (id),
    scenario_id       BIGINT NOT NULL REFERENCES scenarios (id),
    started           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_active         BOOLEAN NOT NULL DEFAULT TRUE,
    finished          TIMESTAMPTZ,
    game_vars         JSONB NOT NULL DEFAULT '{}',
    pending_team_vars JSONB NOT NULL DEFAULT '{}'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_games_one_active_per_team
    ON games (team_id) WHERE is_active;
";
