mod logger;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cstviz::{Session, VisualizerConfig};

/// Inspect the concrete syntax tree of a Python file.
#[derive(Parser)]
#[command(name = "cstviz", version)]
struct Options {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the rendered tree
    Render {
        path: PathBuf,
        /// Emit HTML with clickable anchors
        #[arg(long, conflicts_with = "json")]
        html: bool,
        /// Emit the structured tree as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        layout: Layout,
    },
    /// Print the id of the node nearest to a cursor position
    Lookup {
        path: PathBuf,
        /// 1-based
        line: usize,
        /// 0-based
        column: usize,
        #[command(flatten)]
        layout: Layout,
    },
    /// Print the source range of a node id
    Resolve {
        path: PathBuf,
        id: String,
        #[command(flatten)]
        layout: Layout,
    },
    /// Print the source regenerated from the tree
    Code {
        path: PathBuf,
        /// Highlight tokens as HTML
        #[arg(long)]
        html: bool,
    },
}

#[derive(Args)]
struct Layout {
    /// Hide whitespace and newline nodes
    #[arg(long)]
    compact: bool,
    /// Spaces per nesting level
    #[arg(long, default_value_t = 4)]
    indent: usize,
}

impl Layout {
    fn config(&self) -> VisualizerConfig {
        VisualizerConfig::default()
            .with_compact(self.compact)
            .with_indent_width(self.indent)
    }
}

fn load(path: &Path, config: &VisualizerConfig) -> anyhow::Result<Session> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    Session::parse(&text, config).with_context(|| format!("failed to parse `{}`", path.display()))
}

/// 原样输出源码，或输出着色后的 HTML
fn code(session: &Session, html: bool) -> String {
    if html {
        format!("{}\n", session.code_html())
    } else {
        session.code()
    }
}

fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    logger::init(options.verbose);

    match options.command {
        Command::Render {
            path,
            html,
            json,
            layout,
        } => {
            let config = layout.config();
            let session = load(&path, &config)?;
            let rendered = session.render()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rendered)?);
            } else if html {
                println!("{}", rendered.to_html(config.indent_width));
            } else {
                println!("{}", rendered.to_text(config.indent_width));
            }
        }
        Command::Lookup {
            path,
            line,
            column,
            layout,
        } => {
            let session = load(&path, &layout.config())?;
            match session.lookup_node_at(line, column) {
                Some(id) => println!("{}", id),
                None => anyhow::bail!("no node at {}:{}", line, column),
            }
        }
        Command::Resolve { path, id, layout } => {
            let session = load(&path, &layout.config())?;
            match session.resolve_span(&id) {
                Some(span) => println!("{}", span),
                None => anyhow::bail!("no source range for `{}`", id),
            }
        }
        Command::Code { path, html } => {
            let session = load(&path, &VisualizerConfig::default())?;
            print!("{}", code(&session, html));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_html_flag() {
        let options = Options::try_parse_from(["cstviz", "code", "--html", "a.py"]).unwrap();
        assert!(matches!(options.command, Command::Code { html: true, .. }));

        let options = Options::try_parse_from(["cstviz", "code", "a.py"]).unwrap();
        assert!(matches!(options.command, Command::Code { html: false, .. }));
    }

    #[test]
    fn test_code_output() {
        let session = Session::parse("x = 1  # one\n", &VisualizerConfig::default()).unwrap();
        assert_eq!(code(&session, false), "x = 1  # one\n");

        let html = code(&session, true);
        assert!(html.starts_with("<pre class=\"cst-code\"><span class=\"tok-name\">x</span>"));
        assert!(html.ends_with("</pre>\n"));
        assert!(html.contains("<span class=\"tok-comment\"># one</span>"));
    }
}
