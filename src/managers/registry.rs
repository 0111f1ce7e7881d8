//! Static table of supported package managers

use super::{ManagerKind, OperationKind};
use crate::utils::{CommandSpec, Platform};

const PKG: &str = "{pkg}";
const PYTHON: &str = "{python}";

/// An argv template.
///
/// `{pkg}` is replaced by the package (or query); when absent the package is
/// appended. `{python}` resolves to the platform's Python launcher.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    pub argv: &'static [&'static str],
    /// Run through non-interactive `sudo` on platforms that need privilege
    /// escalation
    pub privileged: bool,
}

impl CommandTemplate {
    const fn plain(argv: &'static [&'static str]) -> Self {
        Self {
            argv,
            privileged: false,
        }
    }

    const fn privileged(argv: &'static [&'static str]) -> Self {
        Self {
            argv,
            privileged: true,
        }
    }

    /// Render the template for a package on the given platform
    pub fn render(&self, package: &str, platform: Platform) -> CommandSpec {
        self.render_with(Some(package), platform, platform.uses_sudo())
    }

    /// Render a template that takes no package, such as a setup command
    pub fn render_bare(&self, platform: Platform) -> CommandSpec {
        self.render_with(None, platform, platform.uses_sudo())
    }

    /// `sudo -n` never prompts: a missing credential fails the attempt
    /// instead of blocking a worker on the terminal
    pub fn render_with(
        &self,
        package: Option<&str>,
        platform: Platform,
        escalate: bool,
    ) -> CommandSpec {
        let mut words: Vec<String> = Vec::with_capacity(self.argv.len() + 3);
        if self.privileged && escalate {
            words.push("sudo".to_string());
            words.push("-n".to_string());
        }

        let mut substituted = false;
        for word in self.argv {
            match *word {
                PKG => {
                    words.extend(package.map(str::to_string));
                    substituted = true;
                }
                PYTHON => words.push(python_program(platform).to_string()),
                other => words.push(other.to_string()),
            }
        }
        if !substituted {
            words.extend(package.map(str::to_string));
        }

        let mut words = words.into_iter();
        let program = words.next().unwrap_or_default();
        CommandSpec::new(program).args(words)
    }
}

/// How to tell whether a manager is installed
#[derive(Debug, Clone, Copy)]
pub enum Probe {
    /// Any of these binaries is on PATH
    Binary(&'static [&'static str]),
    /// This command exits successfully
    Command(&'static [&'static str]),
}

impl Probe {
    /// Render a command probe for the platform
    pub fn command_spec(&self, platform: Platform) -> Option<CommandSpec> {
        match self {
            Probe::Binary(_) => None,
            Probe::Command(argv) => {
                let words: Vec<&str> = argv
                    .iter()
                    .map(|w| if *w == PYTHON { python_program(platform) } else { *w })
                    .collect();
                CommandSpec::from_argv(&words)
            }
        }
    }
}

/// How to bring a missing manager onto the machine
#[derive(Debug, Clone, Copy)]
pub struct ManagerSetup {
    /// Command that installs the manager unattended
    pub command: Option<CommandTemplate>,
    /// Shown when there is no command, or as a hint after it fails
    pub instructions: &'static str,
}

impl ManagerSetup {
    const fn automatic(command: CommandTemplate, instructions: &'static str) -> Self {
        Self {
            command: Some(command),
            instructions,
        }
    }

    const fn manual(instructions: &'static str) -> Self {
        Self {
            command: None,
            instructions,
        }
    }
}

/// Immutable description of one package manager
#[derive(Debug, Clone, Copy)]
pub struct ManagerDescriptor {
    pub kind: ManagerKind,
    pub supported_os: &'static [Platform],
    pub probe: Probe,
    pub install: CommandTemplate,
    pub remove: CommandTemplate,
    /// Native search subcommand, for managers searched through their CLI
    pub search: Option<CommandTemplate>,
    pub setup: ManagerSetup,
}

impl ManagerDescriptor {
    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.supported_os.contains(&platform)
    }

    /// Every registered manager can both install and remove
    pub fn supports(&self, _operation: OperationKind) -> bool {
        true
    }

    pub fn install_command(&self, package: &str, platform: Platform) -> CommandSpec {
        self.install.render(package, platform)
    }

    pub fn remove_command(&self, package: &str, platform: Platform) -> CommandSpec {
        self.remove.render(package, platform)
    }

    pub fn command_for(
        &self,
        operation: OperationKind,
        package: &str,
        platform: Platform,
    ) -> CommandSpec {
        match operation {
            OperationKind::Install => self.install_command(package, platform),
            OperationKind::Remove => self.remove_command(package, platform),
        }
    }

    pub fn search_command(&self, query: &str, platform: Platform) -> Option<CommandSpec> {
        self.search.map(|template| template.render(query, platform))
    }

    pub fn setup_command(&self, platform: Platform) -> Option<CommandSpec> {
        self.setup.command.map(|template| template.render_bare(platform))
    }
}

const UNIX: &[Platform] = &[Platform::Linux, Platform::MacOS];
const LINUX: &[Platform] = &[Platform::Linux];
const WINDOWS: &[Platform] = &[Platform::Windows];
const EVERYWHERE: &[Platform] = &[Platform::Linux, Platform::MacOS, Platform::Windows];

/// The full, fixed set of managers
pub static REGISTRY: [ManagerDescriptor; 13] = [
    ManagerDescriptor {
        kind: ManagerKind::Pip,
        supported_os: EVERYWHERE,
        probe: Probe::Command(&[PYTHON, "-m", "pip", "--version"]),
        install: CommandTemplate::plain(&[PYTHON, "-m", "pip", "install"]),
        remove: CommandTemplate::plain(&[PYTHON, "-m", "pip", "uninstall", "-y"]),
        search: None,
        setup: ManagerSetup::automatic(
            CommandTemplate::plain(&[PYTHON, "-m", "ensurepip", "--upgrade"]),
            "Install Python 3 from https://www.python.org/downloads/",
        ),
    },
    ManagerDescriptor {
        kind: ManagerKind::Npm,
        supported_os: EVERYWHERE,
        probe: Probe::Binary(&["npm"]),
        install: CommandTemplate::plain(&["npm", "install", "-g"]),
        remove: CommandTemplate::plain(&["npm", "uninstall", "-g"]),
        search: None,
        setup: ManagerSetup::manual("Install Node.js (bundles npm) from https://nodejs.org/"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Brew,
        supported_os: UNIX,
        probe: Probe::Binary(&["brew"]),
        install: CommandTemplate::plain(&["brew", "install"]),
        remove: CommandTemplate::plain(&["brew", "uninstall"]),
        search: None,
        setup: ManagerSetup::manual(
            "/bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"",
        ),
    },
    ManagerDescriptor {
        kind: ManagerKind::Apt,
        supported_os: LINUX,
        probe: Probe::Binary(&["apt-get", "apt"]),
        install: CommandTemplate::privileged(&["apt-get", "install", "-y"]),
        remove: CommandTemplate::privileged(&["apt-get", "remove", "-y"]),
        search: Some(CommandTemplate::plain(&["apt-cache", "search", "--names-only"])),
        setup: ManagerSetup::manual("apt comes with Debian and Ubuntu and cannot be installed separately"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Dnf,
        supported_os: LINUX,
        probe: Probe::Binary(&["dnf"]),
        install: CommandTemplate::privileged(&["dnf", "install", "-y"]),
        remove: CommandTemplate::privileged(&["dnf", "remove", "-y"]),
        search: Some(CommandTemplate::plain(&["dnf", "search", "--quiet"])),
        setup: ManagerSetup::manual("dnf comes with Fedora and RHEL 8+ and cannot be installed separately"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Yum,
        supported_os: LINUX,
        probe: Probe::Binary(&["yum"]),
        install: CommandTemplate::privileged(&["yum", "install", "-y"]),
        remove: CommandTemplate::privileged(&["yum", "remove", "-y"]),
        search: Some(CommandTemplate::plain(&["yum", "search", "--quiet"])),
        setup: ManagerSetup::manual("yum comes with CentOS and older RHEL and cannot be installed separately"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Pacman,
        supported_os: LINUX,
        probe: Probe::Binary(&["pacman"]),
        install: CommandTemplate::privileged(&["pacman", "-S", "--noconfirm"]),
        remove: CommandTemplate::privileged(&["pacman", "-R", "--noconfirm"]),
        search: Some(CommandTemplate::plain(&["pacman", "-Ss"])),
        setup: ManagerSetup::manual("pacman comes with Arch Linux and cannot be installed separately"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Zypper,
        supported_os: LINUX,
        probe: Probe::Binary(&["zypper"]),
        install: CommandTemplate::privileged(&["zypper", "--non-interactive", "install"]),
        remove: CommandTemplate::privileged(&["zypper", "--non-interactive", "remove"]),
        search: Some(CommandTemplate::plain(&["zypper", "search", "--match-words"])),
        setup: ManagerSetup::manual("zypper comes with openSUSE and cannot be installed separately"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Apk,
        supported_os: LINUX,
        probe: Probe::Binary(&["apk"]),
        install: CommandTemplate::privileged(&["apk", "add"]),
        remove: CommandTemplate::privileged(&["apk", "del"]),
        search: Some(CommandTemplate::plain(&["apk", "search", "-x"])),
        setup: ManagerSetup::manual("apk comes with Alpine Linux and cannot be installed separately"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Choco,
        supported_os: WINDOWS,
        probe: Probe::Binary(&["choco"]),
        install: CommandTemplate::plain(&["choco", "install", "-y"]),
        remove: CommandTemplate::plain(&["choco", "uninstall", "-y"]),
        search: Some(CommandTemplate::plain(&[
            "choco",
            "search",
            PKG,
            "--limit-output",
            "--exact",
        ])),
        setup: ManagerSetup::manual("Follow https://chocolatey.org/install from an elevated PowerShell"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Winget,
        supported_os: WINDOWS,
        probe: Probe::Binary(&["winget"]),
        install: CommandTemplate::plain(&[
            "winget",
            "install",
            "--accept-package-agreements",
            "--accept-source-agreements",
            "-e",
            "--id",
        ]),
        remove: CommandTemplate::plain(&["winget", "uninstall", "-e", "--id"]),
        search: Some(CommandTemplate::plain(&["winget", "search", PKG, "--exact"])),
        setup: ManagerSetup::manual("Install \"App Installer\" from the Microsoft Store"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Snap,
        supported_os: LINUX,
        probe: Probe::Binary(&["snap"]),
        install: CommandTemplate::privileged(&["snap", "install"]),
        remove: CommandTemplate::privileged(&["snap", "remove"]),
        search: Some(CommandTemplate::plain(&["snap", "find"])),
        setup: ManagerSetup::manual("Follow https://snapcraft.io/docs/installing-snapd for your distribution"),
    },
    ManagerDescriptor {
        kind: ManagerKind::Flatpak,
        supported_os: LINUX,
        probe: Probe::Binary(&["flatpak"]),
        install: CommandTemplate::plain(&["flatpak", "install", "-y", "flathub"]),
        remove: CommandTemplate::plain(&["flatpak", "uninstall", "-y"]),
        search: Some(CommandTemplate::plain(&["flatpak", "search"])),
        setup: ManagerSetup::manual("Follow https://flatpak.org/setup/ for your distribution"),
    },
];

/// Look up the descriptor for a manager
pub fn descriptor(kind: ManagerKind) -> &'static ManagerDescriptor {
    // REGISTRY is declared in ManagerKind::ALL order
    &REGISTRY[kind as usize]
}

fn python_program(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "python",
        _ => "python3",
    }
}
