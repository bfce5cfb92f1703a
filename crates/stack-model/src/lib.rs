pub mod error;
pub mod host;
pub mod registry;
pub mod ssh_config;
pub mod stack;
pub mod status;
pub mod step;

pub use error::{RegistryError, StatusParseError, ValidationError};
pub use host::{
    parse_port, HostTarget, PotentialHost, SshAuth, SshHostConfig, DEFAULT_SSH_PORT,
    LOCAL_HOST_NAME,
};
pub use registry::{add_host, edit_host, import_hosts, remove_host, ImportOutcome};
pub use ssh_config::{filter_known, parse_ssh_config};
pub use stack::{compose_dir, is_compose_file, stack_identifier, Stack, COMPOSE_FILE_NAMES};
pub use status::{parse_compose_ps, ContainerInfo, StackRuntimeInfo, StackStatus};
pub use step::{
    prune_host_step, CommandStep, ComposeCommand, SequenceKind, SequenceTarget, StepScope,
};
