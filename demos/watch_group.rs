use bets_sync::{BetsClient, ClientConfig, ConnectionStatus, GroupId};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bets_sync=debug")),
        )
        .init();

    // BETS_ORIGIN=http://localhost:8080, optionally BETS_SESSION_COOKIE=token=...
    let config = ClientConfig::from_env()?;
    let group_id = GroupId::new(
        std::env::var("BETS_GROUP").expect("BETS_GROUP environment variable not set"),
    );

    let client = BetsClient::new(config)?;

    match client.current_user().await? {
        Some(user) => println!("Signed in as {} <{}>", user.name, user.email),
        None => {
            let email = std::env::var("BETS_EMAIL").expect("not signed in and BETS_EMAIL not set");
            let password =
                std::env::var("BETS_PASSWORD").expect("not signed in and BETS_PASSWORD not set");
            let user = client.api().login(&email, &password).await?;
            println!("Logged in as {}", user.name);
        }
    }

    let group = client.open_group(&group_id).await?;
    println!("Watching {} ({} members)", group.name, group.members.len());
    for pool in client.pools().pools() {
        println!("  [{}] {}", pool.status.as_str(), pool.title);
    }

    let mut status = client.sync().subscribe_status();
    let mut groups = client.groups().subscribe();
    let mut pools = client.pools().subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                println!("Connection: {}", current);
                if current == ConnectionStatus::Closed {
                    println!("Gave up reconnecting, press Ctrl-C to exit");
                }
            }
            Ok(()) = groups.changed() => {
                groups.borrow_and_update();
                if let Some(group) = client.groups().active_group() {
                    println!("Group updated:");
                    for member in &group.members {
                        let name = member.user.as_ref().map(|u| u.name.as_str()).unwrap_or("?");
                        println!("  {:<20} {:>8} pts", name, member.points_balance);
                    }
                }
            }
            Ok(()) = pools.changed() => {
                pools.borrow_and_update();
                println!("Pools updated:");
                for pool in client.pools().pools() {
                    println!("  [{}] {} ({} bets, pot {})", pool.status.as_str(), pool.title, pool.bet_count, pool.total_pot);
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
