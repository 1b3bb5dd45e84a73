use crate::object::EntityKind;

/// Wrapping rule for one entity kind: the scope parameter the entity is bound
/// to, the handler names recognized for that kind, and the event fired for it
/// by the periodic execution path.
#[derive(Debug)]
pub struct WrapRule {
    pub param: &'static str,
    pub handlers: &'static [&'static str],
    pub execute_event: Option<&'static str>,
}

pub const NPC_HANDLERS: &[&str] = &[
    "onCreated",
    "onTimeout",
    "onNpcWarped",
    "onPlayerChats",
    "onPlayerEnters",
    "onPlayerLeaves",
    "onPlayerTouchsMe",
    "onPlayerLogin",
    "onPlayerLogout",
];

pub const WEAPON_HANDLERS: &[&str] = &["onCreated", "onActionServerSide"];

static RUNNER_RULE: WrapRule = WrapRule { param: "runner", handlers: &[], execute_event: None };
static NPC_RULE: WrapRule =
    WrapRule { param: "npc", handlers: NPC_HANDLERS, execute_event: Some("onTimeout") };
static PLAYER_RULE: WrapRule = WrapRule { param: "player", handlers: &[], execute_event: None };
static WEAPON_RULE: WrapRule = WrapRule {
    param: "weapon",
    handlers: WEAPON_HANDLERS,
    execute_event: Some("onActionServerSide"),
};

pub fn rule_for(kind: EntityKind) -> &'static WrapRule {
    match kind {
        EntityKind::Runner => &RUNNER_RULE,
        EntityKind::Npc => &NPC_RULE,
        EntityKind::Player => &PLAYER_RULE,
        EntityKind::Weapon => &WEAPON_RULE,
    }
}

impl EntityKind {
    pub fn param(self) -> &'static str {
        rule_for(self).param
    }

    pub fn execute_event(self) -> Option<&'static str> {
        rule_for(self).execute_event
    }
}

/// Wraps user-authored source in the fixed prologue/epilogue for `kind`.
///
/// The prologue declares each recognized handler name as a unit local and
/// binds the `me` alias to the entity parameter; the epilogue assigns each
/// handler onto the entity only if the user's code actually defined it. This
/// is a pure text transform and runs before the source reaches the compile
/// cache, so caching always keys on final wrapped text.
pub fn wrap_script(kind: EntityKind, source: &str) -> String {
    let rule = rule_for(kind);
    let mut wrapped = String::with_capacity(source.len() + 64 * (rule.handlers.len() + 1));
    for handler in rule.handlers {
        wrapped.push_str("let ");
        wrapped.push_str(handler);
        wrapped.push_str(" = ();\n");
    }
    wrapped.push_str("let me = ");
    wrapped.push_str(rule.param);
    wrapped.push_str(";\n");
    wrapped.push_str(source);
    wrapped.push('\n');
    for handler in rule.handlers {
        wrapped.push_str("if type_of(");
        wrapped.push_str(handler);
        wrapped.push_str(") != \"()\" { me.");
        wrapped.push_str(handler);
        wrapped.push_str(" = ");
        wrapped.push_str(handler);
        wrapped.push_str("; }\n");
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npc_wrap_declares_all_recognized_handlers() {
        let wrapped = wrap_script(EntityKind::Npc, "onTimeout = || me.ticks;");
        for handler in NPC_HANDLERS {
            assert!(wrapped.contains(&format!("let {handler} = ();")), "missing {handler}");
            assert!(wrapped.contains(&format!("me.{handler} = {handler};")), "missing assign for {handler}");
        }
        assert!(wrapped.contains("let me = npc;"));
    }

    #[test]
    fn player_wrap_only_binds_self_alias() {
        let wrapped = wrap_script(EntityKind::Player, "me.greeted = true;");
        assert_eq!(wrapped, "let me = player;\nme.greeted = true;\n");
    }

    #[test]
    fn weapon_wrap_keeps_user_source_between_prologue_and_epilogue() {
        let wrapped = wrap_script(EntityKind::Weapon, "return me.x + 1;");
        let user = wrapped.find("return me.x + 1;").expect("user code present");
        let bind = wrapped.find("let me = weapon;").expect("self binding present");
        let assign = wrapped.find("me.onActionServerSide =").expect("epilogue present");
        assert!(bind < user && user < assign);
    }

    #[test]
    fn wrapping_is_deterministic() {
        let a = wrap_script(EntityKind::Weapon, "me.x = 1;");
        let b = wrap_script(EntityKind::Weapon, "me.x = 1;");
        assert_eq!(a, b);
    }
}
