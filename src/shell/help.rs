/// Commands understood by the shell, with their one-line descriptions.
const COMMANDS: &[(&str, &str)] = &[
    ("help", "Show this help"),
    ("show [PARAM]", "Show the parameter tree, a group, or one parameter"),
    ("set PARAM VALUE", "Change a parameter (path like model.ncat, or name like ncat)"),
    ("reset [PARAM]", "Restore defaults for one parameter, a group, or everything"),
    ("open FILE", "Select the alignment to analyse"),
    ("run", "Start FastTree with the current parameters"),
    ("cancel", "Stop the running job (asks first)"),
    ("save [FILE]", "Save the tree (default: <input>.tre)"),
    ("status", "Show the input and result state"),
    ("params", "Print the parameter snapshot a run would use, as JSON"),
    ("quit", "Leave, cancelling any running job"),
];

pub(crate) fn help_lines() -> Vec<String> {
    let width = COMMANDS.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
    let mut lines = vec!["Commands:".to_string()];
    lines.extend(
        COMMANDS
            .iter()
            .map(|(cmd, what)| format!("  {cmd:<width$}  {what}")),
    );
    lines.push(String::new());
    lines.push("Parameters are locked while a job is running.".into());
    lines
}
