#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is kept verbatim under `command_args.value`.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "analysis_model",
        action: "set_analysis_model",
    },
    CommandSpec {
        command: "image_model",
        action: "set_image_model",
    },
];

/// Live grading controls, landing in `settings_update`.
pub(crate) const SETTING_COMMANDS: &[&str] = &["preset", "intensity", "shadows", "highlights"];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "reference",
        action: "load_reference",
    },
    CommandSpec {
        command: "restore",
        action: "restore_version",
    },
    CommandSpec {
        command: "save",
        action: "save_processed",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "batch",
        action: "upload_batch",
    },
    CommandSpec {
        command: "project",
        action: "project",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "versions",
        action: "list_versions",
    },
    CommandSpec {
        command: "projects",
        action: "list_projects",
    },
    CommandSpec {
        command: "master",
        action: "save_master",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub(crate) const EXPORT_COMMAND: CommandSpec = CommandSpec {
    command: "export",
    action: "export",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/reference <path>",
    "/batch <paths..>",
    "/preset <Estate|Dark|Corporate|Analog>",
    "/intensity <0-100>",
    "/shadows <0-100>",
    "/highlights <0-100>",
    "/analysis_model <name>",
    "/image_model <name>",
    "/generate",
    "/versions",
    "/restore <version id>",
    "/export [dir]",
    "/master",
    "/save [item id]",
    "/project <id> | new [name] | save <name> | delete <id>",
    "/projects",
    "/status",
    "/help",
];
