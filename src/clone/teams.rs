//! Teams, their security group memberships, dashboards and settings.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::clone::types::EntityTally;
use crate::devops::client::DevOpsOps;
use crate::devops::types::{Dashboard, NewTeam, Project, SecurityGroup, Team};

/// Widget fields assigned by the server.
const SERVER_OWNED_WIDGET_FIELDS: &[&str] = &["id", "eTag", "url", "_links", "dashboard"];

/// Group descriptors of this prefix are project-scoped and cannot be added
/// to another project's groups.
const GROUP_DESCRIPTOR_PREFIX: &str = "vssgp.";

/// Name of the target team corresponding to a source team or group.
///
/// The default team is named after its project, so that name is rewritten.
pub fn counterpart_name(name: &str, source: &Project, target: &Project) -> String {
    if name.eq_ignore_ascii_case(&source.default_team_name()) {
        target.default_team_name()
    } else {
        name.to_string()
    }
}

/// Source teams paired with their existing target counterpart.
fn matched_teams<'a>(
    source_teams: &'a [Team],
    target_teams: &'a [Team],
    source: &Project,
    target: &Project,
) -> Vec<(&'a Team, &'a Team)> {
    source_teams
        .iter()
        .filter_map(|team| {
            let name = counterpart_name(&team.name, source, target);
            target_teams
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(&name))
                .map(|t| (team, t))
        })
        .collect()
}

async fn both_team_lists(ops: &dyn DevOpsOps, source: &Project, target: &Project) -> Result<(Vec<Team>, Vec<Team>)> {
    let source_teams = ops
        .list_teams(&source.id)
        .await
        .context("Failed to list source teams")?;
    let target_teams = ops
        .list_teams(&target.id)
        .await
        .context("Failed to list target teams")?;
    Ok((source_teams, target_teams))
}

/// Create every missing team, then copy group memberships best-effort.
pub async fn clone_teams(ops: &dyn DevOpsOps, source: &Project, target: &Project) -> Result<String> {
    let (source_teams, target_teams) = both_team_lists(ops, source, target).await?;

    let mut tally = EntityTally::default();
    for team in &source_teams {
        let name = counterpart_name(&team.name, source, target);
        if target_teams.iter().any(|t| t.name.eq_ignore_ascii_case(&name)) {
            tally.existing();
            continue;
        }
        let request = NewTeam {
            name: name.clone(),
            description: team.description.clone().unwrap_or_default(),
        };
        match ops.create_team(&target.id, &request).await {
            Ok(created) => {
                info!(team = %created.name, "Created team");
                tally.created();
            }
            Err(e) if e.is_already_exists() => tally.existing(),
            Err(e) => {
                warn!(team = %name, error = %e, "Failed to create team");
                tally.skipped();
            }
        }
    }

    if tally.all_failed() {
        anyhow::bail!("No teams could be created ({} failed)", tally.skipped);
    }

    let added = copy_memberships(ops, source, target).await;
    let mut message = tally.summary("teams");
    message.push_str(&format!(", added {added} group members"));
    Ok(message)
}

/// Add source group members to the same-named target groups.
///
/// Returns the number of memberships added. Never fails.
pub async fn copy_memberships(ops: &dyn DevOpsOps, source: &Project, target: &Project) -> usize {
    let groups = async {
        let source_groups = ops.list_groups(&source.id).await?;
        let target_groups = ops.list_groups(&target.id).await?;
        Ok::<_, crate::devops::DevOpsError>((source_groups, target_groups))
    }
    .await;
    let (source_groups, target_groups) = match groups {
        Ok(groups) => groups,
        Err(e) => {
            warn!(error = %e, "Could not list security groups; skipping memberships");
            return 0;
        }
    };

    let mut added = 0;
    for source_group in &source_groups {
        let Some(target_group) = counterpart_group(source_group, &target_groups, source, target) else {
            continue;
        };
        added += copy_group_members(ops, source_group, target_group).await;
    }
    added
}

fn counterpart_group<'a>(
    group: &SecurityGroup,
    target_groups: &'a [SecurityGroup],
    source: &Project,
    target: &Project,
) -> Option<&'a SecurityGroup> {
    let name = counterpart_name(&group.display_name, source, target);
    target_groups
        .iter()
        .find(|g| g.display_name.eq_ignore_ascii_case(&name))
}

async fn copy_group_members(ops: &dyn DevOpsOps, source_group: &SecurityGroup, target_group: &SecurityGroup) -> usize {
    let members = match ops.list_memberships(&source_group.descriptor).await {
        Ok(members) => members,
        Err(e) => {
            warn!(group = %source_group.display_name, error = %e, "Could not list group members");
            return 0;
        }
    };
    let existing: HashSet<String> = ops
        .list_memberships(&target_group.descriptor)
        .await
        .map(|m| m.into_iter().map(|m| m.member_descriptor).collect())
        .unwrap_or_default();

    let mut added = 0;
    for member in members {
        let descriptor = member.member_descriptor;
        if descriptor.starts_with(GROUP_DESCRIPTOR_PREFIX) || existing.contains(&descriptor) {
            continue;
        }
        match ops.add_membership(&descriptor, &target_group.descriptor).await {
            Ok(()) => added += 1,
            Err(e) => warn!(group = %target_group.display_name, error = %e, "Failed to add group member"),
        }
    }
    debug!(group = %target_group.display_name, added, "Copied group members");
    added
}

/// Dashboard body for creation, without server-assigned identifiers.
pub fn dashboard_copy(dashboard: &Dashboard) -> Dashboard {
    let widgets = dashboard
        .widgets
        .iter()
        .cloned()
        .map(|mut widget| {
            if let Some(object) = widget.as_object_mut() {
                for field in SERVER_OWNED_WIDGET_FIELDS {
                    object.remove(*field);
                }
            }
            widget
        })
        .collect::<Vec<Value>>();
    Dashboard {
        id: None,
        name: dashboard.name.clone(),
        description: dashboard.description.clone(),
        widgets,
    }
}

/// Copy dashboards of every team present on both sides.
pub async fn clone_dashboards(ops: &dyn DevOpsOps, source: &Project, target: &Project) -> Result<String> {
    let (source_teams, target_teams) = both_team_lists(ops, source, target).await?;

    let mut tally = EntityTally::default();
    for (source_team, target_team) in matched_teams(&source_teams, &target_teams, source, target) {
        let dashboards = match ops.list_dashboards(&source.id, &source_team.name).await {
            Ok(dashboards) => dashboards,
            Err(e) => {
                warn!(team = %source_team.name, error = %e, "Could not list dashboards");
                tally.skipped();
                continue;
            }
        };
        if dashboards.is_empty() {
            continue;
        }
        let existing: HashSet<String> = ops
            .list_dashboards(&target.id, &target_team.name)
            .await
            .map(|d| d.into_iter().map(|d| d.name.to_lowercase()).collect())
            .unwrap_or_default();

        for dashboard in &dashboards {
            if existing.contains(&dashboard.name.to_lowercase()) {
                tally.existing();
                continue;
            }
            match ops
                .create_dashboard(&target.id, &target_team.name, &dashboard_copy(dashboard))
                .await
            {
                Ok(_) => tally.created(),
                Err(e) if e.is_already_exists() => tally.existing(),
                Err(e) => {
                    warn!(team = %target_team.name, dashboard = %dashboard.name, error = %e, "Failed to create dashboard");
                    tally.skipped();
                }
            }
        }
    }

    if tally.all_failed() {
        anyhow::bail!("No dashboards could be created ({} failed)", tally.skipped);
    }
    Ok(tally.summary("dashboards"))
}

/// Copy team settings for every team present on both sides.
pub async fn configure_teams(ops: &dyn DevOpsOps, source: &Project, target: &Project) -> Result<String> {
    let (source_teams, target_teams) = both_team_lists(ops, source, target).await?;

    let mut tally = EntityTally::default();
    for (source_team, target_team) in matched_teams(&source_teams, &target_teams, source, target) {
        let settings = match ops.get_team_settings(&source.id, &source_team.name).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(team = %source_team.name, error = %e, "Could not read team settings");
                tally.skipped();
                continue;
            }
        };
        match ops
            .update_team_settings(&target.id, &target_team.name, &settings)
            .await
        {
            Ok(_) => tally.created(),
            Err(e) => {
                warn!(team = %target_team.name, error = %e, "Failed to update team settings");
                tally.skipped();
            }
        }
    }

    if tally.all_failed() {
        anyhow::bail!("No team settings could be applied ({} failed)", tally.skipped);
    }
    Ok(format!("Configured {} teams", tally.created))
}
