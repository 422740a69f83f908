//! Boot sequence
//!
//! Turn a configuration and a filesystem description into a running
//! system: build the tree, wire the standard streams into init's context,
//! seed the process table, then run the startup command as init's child.

use crate::config::Config;
use crate::error::{ProcessResult, SysResult, UnixError};
use crate::kernel::{self, Pid, ProcessTable};
use crate::vfs::context::HOME_VAR;
use crate::vfs::{DirectoryDescription, ExecutionContext, Node};
use std::rc::Rc;

/// A booted system, ready to run its startup command
pub struct System {
    root: Rc<Node>,
    table: ProcessTable,
    startup: Rc<Node>,
    args: Vec<String>,
}

impl System {
    /// Build the system. Stream and startup paths are resolved with
    /// privileged access and must name files.
    pub fn boot(config: Config, root: DirectoryDescription) -> SysResult<Self> {
        log::info!("booting, home {}", config.home);
        let root = Node::new_root(root)?;

        let mut env = config.env;
        env.insert(HOME_VAR.to_string(), config.home);
        let mut context = ExecutionContext::new(Rc::clone(&root), env)?;

        for binding in &config.streams {
            let file = resolve_file(&context, &binding.path)?;
            log::debug!("stream {} -> {}", binding.index, binding.path);
            context.set_file_stream(binding.index, file)?;
        }
        let startup = resolve_file(&context, &config.startup.path)?;

        Ok(Self {
            root,
            table: ProcessTable::new(context),
            startup,
            args: config.startup.args,
        })
    }

    pub fn root(&self) -> &Rc<Node> {
        &self.root
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    /// Start the startup command without waiting for it
    pub fn spawn(&self) -> SysResult<Pid> {
        self.table
            .start_process(None, &self.startup, self.args.iter().cloned())
    }

    /// Run the startup command to completion
    pub async fn run(&self) -> ProcessResult<i32> {
        let pid = self.spawn()?;
        let result = self.table.wait_to_finish(pid).await;
        match &result {
            Ok(code) => log::info!("startup command exited with code {}", code),
            Err(e) => log::error!("startup command failed: {}", e),
        }
        result
    }

    /// Run the startup command on this thread's executor
    pub fn run_blocking(self) -> ProcessResult<i32> {
        kernel::block_on(async move { self.run().await })
    }
}

fn resolve_file(context: &ExecutionContext, path: &str) -> SysResult<Rc<Node>> {
    context
        .resolve_path(path, true)
        .ok()
        .filter(|node| node.is_file())
        .ok_or_else(|| {
            UnixError::invalid_argument(format!("'{}' must point to an existing file", path))
        })
}
