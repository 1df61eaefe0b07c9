//! Read-only commands: printing the tree of a period and listing periods.

use crate::args::{ShowArgs, ShowFormat};
use crate::commands::{adapter, Out};
use crate::graph::GraphEngine;
use crate::model::{GraphView, Scope, ROOT};
use crate::{Config, Result};
use anyhow::Context;

/// Prints the tree of `scope`.
///
/// With [`ShowFormat::Tree`] the message is an indented outline, one line per node with its
/// index and cost. With [`ShowFormat::Json`] the message is the `{ nodes, edges }` view as JSON.
/// Either way the structure holds the view.
pub async fn show(config: Config, scope: Scope, args: ShowArgs) -> Result<Out<GraphView>> {
    let graph = adapter(&config).load(scope).await?;
    let engine = graph.engine();
    let view = engine.query();
    let message = match args.format() {
        ShowFormat::Tree => render_tree(engine),
        ShowFormat::Json => {
            serde_json::to_string_pretty(&view).context("Unable to serialize the tree")?
        }
    };
    Ok(Out::new(message, view))
}

/// Lists the periods of the scope's owner that hold data.
pub async fn periods(config: Config, scope: Scope) -> Result<Out<Vec<String>>> {
    let periods = adapter(&config).periods(scope.owner()).await?;
    let message = if periods.is_empty() {
        format!("No periods found for {}", scope.owner())
    } else {
        format!("Periods for {}: {}", scope.owner(), periods.join(", "))
    };
    Ok(Out::new(message, periods))
}

/// Renders the tree depth-first, children in insertion order, two spaces per level.
fn render_tree(engine: &GraphEngine) -> String {
    let mut lines = Vec::new();
    let mut stack = vec![(ROOT, 0usize)];
    while let Some((index, depth)) = stack.pop() {
        let Some(node) = engine.node(index) else {
            continue;
        };
        let hidden = if node.visible { "" } else { " (hidden)" };
        lines.push(format!(
            "{:indent$}{} [{}] {}{hidden}",
            "",
            node.name,
            node.index,
            node.cost,
            indent = depth * 2
        ));
        for &child in engine.children_of(index).iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::AddArgs;
    use crate::commands::add;
    use crate::model::Amount;
    use crate::test::TestEnv;
    use std::str::FromStr;

    async fn add_leaf(env: &TestEnv, scope: &Scope, name: &str, cost: &str, category: &str) {
        let args = AddArgs::new(name, Amount::from_str(cost).unwrap(), category);
        add(env.config(), scope.clone(), args).await.unwrap();
    }

    #[tokio::test]
    async fn test_show_tree() {
        let env = TestEnv::new().await;
        let scope = env.scope().clone();
        add_leaf(&env, &scope, "Coffee", "4.50", "Food").await;
        add_leaf(&env, &scope, "Bagel", "3", "Food").await;
        add_leaf(&env, &scope, "Bus", "2.75", "Transport").await;

        let out = show(env.config(), scope, ShowArgs::new(ShowFormat::Tree))
            .await
            .unwrap();
        let expected = "\
Expenses [0] $10.25
  Food [1] $7.50
    Coffee [2] $4.50
    Bagel [3] $3.00
  Transport [4] $2.75
    Bus [5] $2.75";
        assert_eq!(out.message(), expected);
        let view = out.structure().unwrap();
        assert_eq!(view.nodes.len(), 6);
        assert_eq!(view.edges.len(), 5);
    }

    #[test]
    fn test_render_tree_nests_moved_categories() {
        use crate::model::LeafMeta;

        let mut engine = GraphEngine::new();
        let cost = Amount::from_str("12").unwrap();
        engine
            .add_leaf("Pizza", cost, "Takeout", LeafMeta::default())
            .unwrap();
        engine
            .add_leaf("Apples", cost, "Food", LeafMeta::default())
            .unwrap();
        let takeout = engine.find_category("Takeout").unwrap();
        engine.move_category(takeout, "Food").unwrap();

        let expected = "\
Expenses [0] $24.00
  Food [3] $24.00
    Apples [4] $12.00
    Takeout [1] $12.00
      Pizza [2] $12.00";
        assert_eq!(render_tree(&engine), expected);
    }

    #[tokio::test]
    async fn test_show_json() {
        let env = TestEnv::new().await;
        let scope = env.scope().clone();
        add_leaf(&env, &scope, "Coffee", "4.50", "Food").await;

        let out = show(env.config(), scope, ShowArgs::new(ShowFormat::Json))
            .await
            .unwrap();
        let parsed: GraphView = serde_json::from_str(out.message()).unwrap();
        assert_eq!(&parsed, out.structure().unwrap());
    }

    #[tokio::test]
    async fn test_show_empty_scope() {
        let env = TestEnv::new().await;
        let out = show(env.config(), env.scope().clone(), ShowArgs::default())
            .await
            .unwrap();
        assert_eq!(out.message(), "Expenses [0] $0.00");
    }

    #[tokio::test]
    async fn test_periods() {
        let env = TestEnv::new().await;
        let march = env.scope().clone();
        let january = Scope::new(march.owner(), "2025-01");
        add_leaf(&env, &march, "Coffee", "4.50", "Food").await;
        add_leaf(&env, &january, "Rent", "1200", "Housing").await;

        let out = periods(env.config(), march.clone()).await.unwrap();
        assert_eq!(
            out.structure().unwrap(),
            &vec!["2025-01".to_string(), "2025-03".to_string()]
        );

        let other = Scope::new("nobody@example.com", "2025-03");
        let out = periods(env.config(), other).await.unwrap();
        assert!(out.message().starts_with("No periods found"));
    }
}
