use serde::Deserialize;
use sidewire::prelude::*;

// ---------------------------------------------------------------------------
// Push payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Login {
    name: String,
}

/// What the service sends when someone picks our menu entry.
#[derive(Debug, Deserialize)]
struct MenuSelection {
    player: String,
    #[serde(default)]
    args: Vec<String>,
}

fn greeting(bot_name: &str, player: &str) -> String {
    format!("welcome {player}, I'm {bot_name}. Try the `echo` menu entry.")
}

fn echo_text(selection: &MenuSelection) -> String {
    if selection.args.is_empty() {
        "(nothing to echo)".to_string()
    } else {
        selection.args.join(" ")
    }
}

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sidewire::logging::init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "localhost:24011".to_string());
    let client = Client::builder().host(&host).build();

    let (_, mut logins) = client.subscribe(PushKind::IdentityJoined);
    let (_, mut menu) = client.subscribe(PushKind::MenuTriggered);
    client.on(PushKind::IdentityLeft, |push| {
        tracing::info!(data = %push.data, "identity left");
        Ok(())
    });

    let bot_name = client.connect().await?;
    let online = client.list_identities().await?;
    tracing::info!(%bot_name, online = online.len(), "echo bot running");

    let sub_id = client
        .register_menu(&MenuEntry::new("echo", "repeats what you type"))
        .await?;
    tracing::info!(%sub_id, "menu entry registered");

    loop {
        tokio::select! {
            Some(push) = logins.recv() => {
                let login: Login = match push.data_as() {
                    Ok(login) => login,
                    Err(e) => {
                        tracing::warn!(error = %e, "unexpected login payload");
                        continue;
                    }
                };
                client.say_to(&login.name, &greeting(&bot_name, &login.name)).await?;
            }
            Some(push) = menu.recv() => {
                let selection: MenuSelection = match push.data_as() {
                    Ok(selection) => selection,
                    Err(e) => {
                        tracing::warn!(error = %e, "unexpected menu payload");
                        continue;
                    }
                };
                let player = client.identity(IdentityQuery::Name(selection.player.clone())).await;
                match player {
                    Ok(player) => player.say(&echo_text(&selection)).await?,
                    Err(SidewireError::IdentityNotFound(_)) => {
                        // Joined after our last listing.
                        client.list_identities().await?;
                        client.say_to(&selection.player, &echo_text(&selection)).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            else => break,
        }
    }

    client.close().await?;
    Ok(())
}
