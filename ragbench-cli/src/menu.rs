//! Interactive metadata menu.

use dialoguer::{Input, Select};
use ragbench_core::QnaClient;

const MENU_ITEMS: [&str; 3] = [
    "List QnA systems",
    "Show LLM providers for a system id",
    "Exit",
];

/// Loop over the menu until the user picks "Exit".
///
/// A failed lookup prints its error and returns to the menu.
pub async fn run(client: &QnaClient) -> anyhow::Result<()> {
    loop {
        let selection = Select::new()
            .with_prompt("What do you want to look up?")
            .items(&MENU_ITEMS)
            .default(0)
            .interact()?;

        let result = match selection {
            0 => client.list_systems().await,
            1 => {
                let system_id: String = Input::new()
                    .with_prompt("System id")
                    .interact_text()?;
                client.llm_providers(system_id.trim()).await
            }
            _ => return Ok(()),
        };

        match result {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(e) => println!("{}", e),
        }
    }
}
