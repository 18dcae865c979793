use serde::{Deserialize, Serialize};

use super::AppState;
use crate::db;
use crate::model::{
    AccountId, EnhancementState, InstanceId, SkillLevels, MAX_ASCENSION, MAX_SKILL_LEVEL,
};
use crate::planner::{
    compute_account_requirements, compute_servant_max_requirements, AccountRequirements,
    ComputeOptions, RequirementAccumulator, ServantSnapshot,
};
use crate::utils::coerce_int;

/// Highest level reachable with grails.
pub const MAX_LEVEL: i64 = 120;

/// Raw form fields for an enhancement state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancementInput {
    pub level: String,
    pub ascension: String,
    pub skills: [String; 3],
    #[serde(default)]
    pub append_skills: [String; 3],
}

/// Turns form input into a valid state. Skill slot 1 always gets a level;
/// other blank slots stay unset.
pub fn parse_enhancement_input(input: &EnhancementInput) -> EnhancementState {
    let skill = |value: &str| coerce_int(value, 1, MAX_SKILL_LEVEL as i64) as u8;
    let optional_skill = |value: &str| (!value.trim().is_empty()).then(|| skill(value));

    EnhancementState {
        level: coerce_int(&input.level, 1, MAX_LEVEL) as u32,
        ascension: coerce_int(&input.ascension, 0, MAX_ASCENSION as i64) as u8,
        skills: SkillLevels::new(
            Some(skill(&input.skills[0])),
            optional_skill(&input.skills[1]),
            optional_skill(&input.skills[2]),
        ),
        append_skills: SkillLevels::new(
            optional_skill(&input.append_skills[0]),
            optional_skill(&input.append_skills[1]),
            optional_skill(&input.append_skills[2]),
        ),
    }
}

/// Cost of fully enhancing one owned servant.
pub async fn get_servant_requirements(
    state: &AppState,
    account_id: AccountId,
    instance_id: InstanceId,
    options: Option<ComputeOptions>,
) -> Result<RequirementAccumulator, String> {
    let account = db::accounts::get_account(&state.pool, account_id)
        .await
        .map_err(|e| format!("Failed to get account: {}", e))?
        .ok_or_else(|| "Account not found".to_string())?;

    let master = account
        .servant(instance_id)
        .ok_or_else(|| format!("Servant {} not found", instance_id))?;
    let servant = state
        .catalog
        .servant(master.game_id)
        .ok_or_else(|| format!("Game servant {} not in catalog", master.game_id))?;

    Ok(compute_servant_max_requirements(
        &state.catalog,
        servant,
        ServantSnapshot {
            state: &master.state,
            costumes: &account.costumes,
        },
        &state.options(options),
    ))
}

/// Cost of fully enhancing every owned servant.
pub async fn get_account_requirements(
    state: &AppState,
    account_id: AccountId,
    options: Option<ComputeOptions>,
) -> Result<AccountRequirements, String> {
    let account = db::accounts::get_account(&state.pool, account_id)
        .await
        .map_err(|e| format!("Failed to get account: {}", e))?
        .ok_or_else(|| "Account not found".to_string())?;

    Ok(compute_account_requirements(
        &state.catalog,
        &account,
        &state.options(options),
    ))
}
