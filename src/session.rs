//! One llmq invocation: resolves the target, then runs the requested action.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::CommandFactory;
use context_store::{context_path, default_locator, read_document, ContextStore, Locator};
use llmq_plugin::{collect_args, Document, Plugin, PluginArg, PluginRegistry, PluginSession};
use tracing::{debug, info, warn};

use crate::auth::{ensure_auth_file, read_auth};
use crate::cli::{Action, Cli, Target};
use crate::config::EnvConfig;
use crate::editor::{editor_command, spawn_editor};
use crate::paths::PluginDirs;
use crate::transport::{is_retryable, Request, Transport, RETRY_DELAY};

/// Runs actions against a plugin registry and a transport.
pub struct Driver<'a> {
    registry: &'a PluginRegistry,
    transport: &'a dyn Transport,
    editor: Option<String>,
    retry_delay: Duration,
    locator: Option<Box<dyn Locator>>,
}

impl<'a> Driver<'a> {
    pub fn new(
        registry: &'a PluginRegistry,
        transport: &'a dyn Transport,
        env: &EnvConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            editor: env.editor.clone(),
            retry_delay: RETRY_DELAY,
            locator: None,
        }
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Replaces the platform locator used by `kill`.
    #[must_use]
    pub fn with_locator(mut self, locator: Box<dyn Locator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn run(&self, cli: &Cli, stdin: &mut dyn Read, out: &mut dyn Write) -> Result<()> {
        cli.validate()?;
        let target = cli.target.as_deref().map(Target::parse);

        match cli.action {
            Action::Help => return self.help(target.as_ref(), out),
            Action::List => {
                out.write_all(self.registry.listing().as_bytes())?;
                return Ok(());
            }
            _ => {}
        }

        let target =
            target.ok_or_else(|| anyhow!("action \"{}\" requires a PLUGIN", cli.action))?;
        let plugin = self.registry.get(&target.plugin)?;
        let dirs = PluginDirs::resolve(plugin.as_ref())?;
        let context = target
            .context
            .as_deref()
            .map(|name| context_path(&dirs.data_dir, name))
            .transpose()?;
        debug!(
            action = %cli.action,
            plugin = plugin.name(),
            context = ?context,
            "resolved target"
        );

        if cli.action.requires_context() && context.is_none() {
            bail!("action \"{}\" requires a CONTEXT", cli.action);
        }

        match (cli.action, context) {
            (Action::Path, context) => {
                let path = context.unwrap_or_else(|| dirs.data_dir.clone());
                writeln!(out, "{}", path.display())?;
                Ok(())
            }
            (Action::Auth, _) => {
                let auth_file = dirs.auth_file();
                ensure_auth_file(&auth_file)?;
                spawn_editor(&self.editor(), &dirs.config_dir, &auth_file)
            }
            (Action::Edit, Some(path)) => {
                ContextStore::create(&path)?;
                spawn_editor(&self.editor(), &dirs.data_dir, &path)
            }
            (Action::Rm, Some(path)) => {
                if !ContextStore::remove(&path)? {
                    bail!("context {} does not exist", path.display());
                }
                Ok(())
            }
            (Action::Kill, Some(path)) => self.kill(&path),
            (Action::Query | Action::Chat | Action::Init, context) => {
                self.request(cli, plugin.as_ref(), &dirs, context, stdin, out)
            }
            (action, None) => bail!("action \"{action}\" requires a CONTEXT"),
            (Action::Help | Action::List, Some(_)) => Ok(()),
        }
    }

    fn help(&self, target: Option<&Target>, out: &mut dyn Write) -> Result<()> {
        let help = match target {
            Some(target) => {
                let plugin = self.registry.get(&target.plugin)?;
                plugin.command().render_long_help()
            }
            None => Cli::command().render_long_help(),
        };
        write!(out, "{help}")?;
        Ok(())
    }

    fn editor(&self) -> String {
        editor_command(self.editor.as_deref())
    }

    fn kill(&self, path: &Path) -> Result<()> {
        let pid = match &self.locator {
            Some(locator) => locator.find_and_signal(path)?,
            None => default_locator()?.find_and_signal(path)?,
        };
        info!(pid, context = %path.display(), "terminated context holder");
        Ok(())
    }

    fn request(
        &self,
        cli: &Cli,
        plugin: &dyn Plugin,
        dirs: &PluginDirs,
        context: Option<PathBuf>,
        stdin: &mut dyn Read,
        out: &mut dyn Write,
    ) -> Result<()> {
        let name = plugin.name();
        let mut args = collect_args(plugin.command(), &cli.plugin_args)
            .with_context(|| format!("invalid arguments for plugin \"{name}\""))?;

        let reads_stdin = matches!(cli.action, Action::Query | Action::Chat) && !cli.no_stdin;
        if reads_stdin && !args.iter().any(PluginArg::is_positional) {
            let mut message = String::new();
            stdin
                .read_to_string(&mut message)
                .context("could not read stdin")?;
            if !message.is_empty() {
                args.push(PluginArg::positional(message));
            }
        }

        let auth_file = dirs.auth_file();
        ensure_auth_file(&auth_file)?;
        let auth = read_auth(&auth_file)?;

        // Chat and init lock before reading so no other writer can slip in
        // between load and commit.
        let (mut store, document) = match (&context, cli.action) {
            (Some(path), Action::Chat | Action::Init) => {
                ContextStore::create(path)?;
                let store = ContextStore::open(path)?;
                let document = store.load()?;
                (Some(store), document)
            }
            (Some(path), _) => {
                ContextStore::create(path)?;
                (None, read_document(path)?)
            }
            (None, _) => (None, Document::new()),
        };

        let mut session = plugin
            .start(document, &args, &auth)
            .with_context(|| format!("failed to initialize plugin \"{name}\""))?;

        if let Some(store) = store.as_mut() {
            store.commit(session.context())?;
        }
        if cli.action == Action::Init {
            return Ok(());
        }

        let print = !cli.quiet;
        let snapshot = session.context().clone();
        let mut retried = false;
        loop {
            let mut echo = EchoTracker::new(&mut *out);
            let result = self.exchange(name, session.as_mut(), store.as_mut(), print, &mut echo);
            let echoed = echo.written;
            match result {
                Ok(()) => return Ok(()),
                Err(error) if cli.retry && !retried && is_retryable(&error) => {
                    warn!(error = %format!("{error:#}"), "reply failed, reissuing request");
                    retried = true;
                    // Terminate the abandoned partial reply before the new one.
                    if echoed {
                        writeln!(out)?;
                        out.flush()?;
                    }
                    session.restore(snapshot.clone());
                    if let Some(store) = store.as_mut() {
                        store.commit(&snapshot)?;
                    }
                    thread::sleep(self.retry_delay);
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Sends one request and folds the reply, committing after every chunk
    /// when a store is attached.
    fn exchange(
        &self,
        name: &str,
        session: &mut dyn PluginSession,
        mut store: Option<&mut ContextStore>,
        print: bool,
        out: &mut dyn Write,
    ) -> Result<()> {
        let request = Request {
            url: session.url()?,
            headers: session.headers()?,
            body: session.post()?,
        };
        let failure = || format!("failed to process reply using plugin \"{name}\"");

        self.transport.send(&request, &mut |chunk: &[u8]| {
            let more = session
                .on_reply(chunk, &mut *out, print)
                .with_context(failure)?;
            if let Some(store) = store.as_deref_mut() {
                store.commit(session.context())?;
            }
            Ok(more)
        })?;

        session.on_finish(&mut *out, print).with_context(failure)?;
        if let Some(store) = store {
            store.commit(session.context())?;
        }
        Ok(())
    }
}

/// Remembers whether any reply text reached the wrapped writer.
struct EchoTracker<W> {
    inner: W,
    written: bool,
}

impl<W: Write> EchoTracker<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            written: false,
        }
    }
}

impl<W: Write> Write for EchoTracker<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written |= written > 0;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
