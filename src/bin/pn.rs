use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use RustCPN::analysis::StateGraph;
use RustCPN::config::ExplorerConfig;
use RustCPN::net::io;
use RustCPN::options::Options;

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let from_env = match Options::parse_from_str(&std::env::var("PN_FLAGS").unwrap_or_default()) {
        Ok(options) => options,
        Err(err) => {
            warn!("ignoring PN_FLAGS: {}", err);
            Options::default()
        }
    };
    debug!("PN options from environment: {:?}", from_env);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = Options::parse_from_args(&args)
        .map_err(|err| anyhow::anyhow!("{}", err))
        .context("Failed to parse command line")?;
    let options = from_env.merge(cli);

    let config = options.apply(ExplorerConfig::load_from_file(&options.config)?);
    debug!("explorer config: {:?}", config);

    let Some(path) = options.net.as_ref() else {
        bail!("no net given, usage: pn <NET> [OPTIONS]");
    };
    let net = io::load_net(path).with_context(|| format!("Failed to load net: {:?}", path))?;
    info!(
        "loaded net {} with {} places and {} transitions",
        net.name,
        net.places().count(),
        net.transitions().count()
    );

    let mut graph = StateGraph::with_config(&net, config.graph_config());
    graph.build().context("Failed to build the state graph")?;
    let stats = graph.stats();
    info!("state graph: {:?}", stats);
    println!(
        "{}: {} states, {} edges, {} deadlocks{}",
        net.name,
        stats.state_count,
        stats.edge_count,
        stats.deadlock_count,
        if stats.truncated { " (truncated)" } else { "" }
    );

    if let Some(dot) = &config.dot_output {
        graph
            .write_dot(dot, config.include_edges_in_dot)
            .with_context(|| format!("Failed to write DOT file: {:?}", dot))?;
        info!("state graph written to {:?}", dot);
    }
    if let Some(summary) = &config.json_output {
        io::write_to(summary, &graph.export(), options.format)
            .with_context(|| format!("Failed to write summary: {:?}", summary))?;
        info!("summary written to {:?}", summary);
    }
    Ok(())
}
