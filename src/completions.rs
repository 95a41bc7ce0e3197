//! Shell completions generation

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io::{self, IsTerminal};

use crate::cli::Cli;

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    if io::stdout().is_terminal() {
        eprintln!("\n{}", completion_instructions(shell));
    }
}

/// Installation hint for a shell's completion script
pub fn completion_instructions(shell: Shell) -> &'static str {
    match shell {
        Shell::Bash => "# Add to ~/.bashrc:\neval \"$(cmdguard completions bash)\"",
        Shell::Zsh => "# Save to a directory in $fpath:\ncmdguard completions zsh > ~/.zsh/completions/_cmdguard",
        Shell::Fish => "# Save to fish completions directory:\ncmdguard completions fish > ~/.config/fish/completions/cmdguard.fish",
        Shell::PowerShell => "# Add to your PowerShell profile:\ncmdguard completions powershell | Out-String | Invoke-Expression",
        Shell::Elvish => "# Add to ~/.elvish/rc.elv:\neval (cmdguard completions elvish | slurp)",
        _ => "# Print the script with: cmdguard completions <shell>",
    }
}
