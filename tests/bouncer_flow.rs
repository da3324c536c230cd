//! End-to-end flows through a real gateway, session and upstream link.

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{FakeUpstream, TestBouncer, TestClient};
use slbnc::db::Role;
use slbnc_proto::Message;
use std::time::Duration;

fn privmsg_ending(text: &'static str) -> impl FnMut(&Message) -> bool {
    move |m| m.is("PRIVMSG") && m.last_arg().is_some_and(|t| t.ends_with(text))
}

async fn cap(client: &mut TestClient, line: &str) -> anyhow::Result<Message> {
    client.send_raw(line).await?;
    let msgs = client.recv_until(|m| m.is("CAP")).await?;
    Ok(msgs.into_iter().last().expect("recv_until returns the match"))
}

/// One user, one network, upstream registered.
async fn setup() -> anyhow::Result<(TestBouncer, FakeUpstream, TestClient)> {
    let bouncer = TestBouncer::start().await?;
    bouncer.add_user("alice", "hunter2", Role::User).await?;
    let upstream = FakeUpstream::bind().await?;
    bouncer.add_network("alice", "libera", upstream.addr()?).await?;
    let (link, nick) = upstream.accept_registered().await?;
    assert_eq!(nick, "alice");
    Ok((bouncer, upstream, link))
}

#[tokio::test]
async fn test_devices_share_live_traffic_and_replay_missed_lines() -> anyhow::Result<()> {
    let (bouncer, _upstream, mut link) = setup().await?;

    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    let burst = laptop.recv_numeric(376).await?;
    assert!(burst.iter().any(|m| m.numeric() == Some(1)));

    let mut phone = bouncer.login("alice@libera:phone", "alice", "hunter2").await?;
    phone.recv_numeric(376).await?;
    bouncer.wait_for_devices("alice", "libera", &["laptop", "phone"]).await?;

    link.send_raw(":bob!b@example.org PRIVMSG alice :both of you").await?;
    laptop.recv_until(privmsg_ending("both of you")).await?;
    phone.recv_until(privmsg_ending("both of you")).await?;

    phone.send_raw("QUIT :bye").await?;
    phone.recv_eof().await?;
    bouncer.wait_for_devices("alice", "libera", &["laptop"]).await?;

    link.send_raw(":bob!b@example.org PRIVMSG alice :while you were out").await?;
    laptop.recv_until(privmsg_ending("while you were out")).await?;

    // The phone missed exactly one line.
    let mut phone = bouncer.login("alice@libera:phone", "alice", "hunter2").await?;
    let seen = phone.recv_until(privmsg_ending("while you were out")).await?;
    let replayed: Vec<&Message> = seen
        .iter()
        .filter(|m| m.is("PRIVMSG") && m.prefix.as_deref() != Some("-slbnc!~slbnc@slbnc"))
        .collect();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].arg(0), Some("alice"));
    assert!(replayed[0].prefix.as_deref().is_some_and(|p| p.starts_with("bob!")));

    phone.send_raw("QUIT").await?;
    phone.recv_eof().await?;
    bouncer.wait_for_devices("alice", "libera", &["laptop"]).await?;

    // Nothing new since: a second attach replays nothing.
    let mut phone = bouncer.login("alice@libera:phone", "alice", "hunter2").await?;
    phone.recv_numeric(376).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    link.send_raw(":bob!b@example.org PRIVMSG alice :marker").await?;
    let seen = phone.recv_until(privmsg_ending("marker")).await?;
    assert!(
        !seen
            .iter()
            .any(|m| m.last_arg().is_some_and(|t| t.contains("while you were out")))
    );

    Ok(())
}

#[tokio::test]
async fn test_client_lines_reach_upstream() -> anyhow::Result<()> {
    let (bouncer, _upstream, mut link) = setup().await?;

    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;

    laptop.send_raw("PRIVMSG #rust :hello from the laptop").await?;
    let got = link
        .recv_until(|m| m.is("PRIVMSG"))
        .await?
        .pop()
        .expect("recv_until returns the match");
    assert_eq!(got.arg(0), Some("#rust"));
    assert_eq!(got.last_arg(), Some("hello from the laptop"));
    Ok(())
}

#[tokio::test]
async fn test_away_is_aggregated_across_devices() -> anyhow::Result<()> {
    let (bouncer, _upstream, mut link) = setup().await?;

    // Nobody attached yet: away.
    let away = link.recv_until(|m| m.is("AWAY")).await?.pop().expect("match");
    assert_eq!(away.last_arg(), Some("Away"));

    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;
    let back = link.recv_until(|m| m.is("AWAY")).await?.pop().expect("match");
    assert!(back.args.is_empty());

    let mut phone = bouncer.login("alice@libera:phone", "alice", "hunter2").await?;
    phone.recv_numeric(376).await?;
    bouncer.wait_for_devices("alice", "libera", &["laptop", "phone"]).await?;

    // The phone is still present, so marking the laptop away changes nothing.
    laptop.send_raw("AWAY :at lunch").await?;
    phone.send_raw("QUIT").await?;
    phone.recv_eof().await?;

    let away = link.recv_until(|m| m.is("AWAY")).await?.pop().expect("match");
    assert_eq!(away.last_arg(), Some("at lunch"));
    Ok(())
}

#[tokio::test]
async fn test_upstream_loss_closes_clients() -> anyhow::Result<()> {
    let (bouncer, upstream, link) = setup().await?;

    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;

    drop(link);
    let seen = laptop.recv_eof().await?;
    assert!(
        seen.iter()
            .any(|m| m.is("ERROR") && m.last_arg() == Some("Lost connection to the IRC server."))
    );

    // The session reconnects on its own.
    let (_link, nick) = upstream.accept_registered().await?;
    assert_eq!(nick, "alice");
    Ok(())
}

#[tokio::test]
async fn test_tags_stripped_for_plain_clients() -> anyhow::Result<()> {
    let (bouncer, _upstream, mut link) = setup().await?;
    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;

    link.send_raw("@time=2020-01-01T00:00:00.000Z;account=bob :bob!b@example.org PRIVMSG alice :tagged")
        .await?;
    let got = laptop.recv_until(privmsg_ending("tagged")).await?.pop().expect("match");
    assert!(got.tags.is_empty());

    link.send_raw(":bob!b@example.org PRIVMSG alice :untagged").await?;
    let got = laptop.recv_until(privmsg_ending("untagged")).await?.pop().expect("match");
    assert!(got.tags.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_server_time_clients_get_live_timestamps() -> anyhow::Result<()> {
    let (bouncer, _upstream, mut link) = setup().await?;
    let mut tablet = TestClient::connect(&bouncer.address()).await?;
    cap(&mut tablet, "CAP LS 302").await?;
    let ack = cap(&mut tablet, "CAP REQ :server-time").await?;
    assert_eq!(ack.arg(1), Some("ACK"));
    tablet.login("alice@libera:tablet", "alice", "hunter2").await?;
    tablet.send_raw("CAP END").await?;
    tablet.recv_numeric(376).await?;

    link.send_raw(":bob!b@example.org PRIVMSG alice :stamped here").await?;
    let got = tablet.recv_until(privmsg_ending("stamped here")).await?.pop().expect("match");
    assert!(got.tag("time").flatten().is_some_and(|t| t.ends_with('Z')));

    link.send_raw("@time=2020-01-01T00:00:00.000Z :bob!b@example.org PRIVMSG alice :kept").await?;
    let got = tablet.recv_until(privmsg_ending("kept")).await?.pop().expect("match");
    assert_eq!(got.tag("time"), Some(Some("2020-01-01T00:00:00.000Z")));
    Ok(())
}

#[tokio::test]
async fn test_overlong_upstream_line_is_skipped() -> anyhow::Result<()> {
    let (bouncer, _upstream, mut link) = setup().await?;
    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;

    let huge = "x".repeat(9000);
    link.send_raw(&format!(":bob!b@example.org PRIVMSG alice :{huge}")).await?;
    link.send_raw(":bob!b@example.org PRIVMSG alice :still here").await?;
    let seen = laptop.recv_until(privmsg_ending("still here")).await?;
    assert!(!seen.iter().any(|m| m.is("ERROR")));
    assert!(!seen.iter().any(|m| m.last_arg().is_some_and(|t| t.len() > 1000)));
    bouncer.wait_for_devices("alice", "libera", &["laptop"]).await?;
    Ok(())
}

#[tokio::test]
async fn test_timezone_is_kept_per_device() -> anyhow::Result<()> {
    let (bouncer, _upstream, _link) = setup().await?;
    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;

    laptop.send_raw("PRIVMSG -slbnc :timezone +02:00").await?;
    let reply = laptop.recv_until(|m| m.is("PRIVMSG")).await?.pop().expect("match");
    assert_eq!(reply.last_arg(), Some("Time zone set to UTC+02:00"));
    laptop.send_raw("QUIT").await?;
    laptop.recv_eof().await?;

    let mut phone = bouncer.login("alice@libera:phone", "alice", "hunter2").await?;
    phone.recv_numeric(376).await?;
    phone.send_raw("PRIVMSG -slbnc :timezone").await?;
    let reply = phone.recv_until(|m| m.is("PRIVMSG")).await?.pop().expect("match");
    assert!(reply.last_arg().is_some_and(|t| t.starts_with("Time zone not set")));

    let mut laptop = bouncer.login("alice@libera:laptop", "alice", "hunter2").await?;
    laptop.recv_numeric(376).await?;
    laptop.send_raw("PRIVMSG -slbnc :timezone").await?;
    let reply = laptop.recv_until(|m| m.is("PRIVMSG")).await?.pop().expect("match");
    assert_eq!(reply.last_arg(), Some("Time zone: UTC+02:00"));
    Ok(())
}

#[tokio::test]
async fn test_bad_password_is_rejected() -> anyhow::Result<()> {
    let bouncer = TestBouncer::start().await?;
    bouncer.add_user("alice", "hunter2", Role::User).await?;

    let mut client = bouncer.login("alice@libera", "alice", "wrong").await?;
    let seen = client.recv_eof().await?;
    let error = seen.iter().find(|m| m.is("ERROR")).expect("ERROR before close");
    assert_eq!(error.last_arg(), Some("Unknown username: alice or bad password."));
    Ok(())
}

#[tokio::test]
async fn test_commands_before_login_are_refused() -> anyhow::Result<()> {
    let bouncer = TestBouncer::start().await?;

    let mut client = TestClient::connect(&bouncer.address()).await?;
    client.send_raw("JOIN #rust").await?;
    let seen = client.recv_eof().await?;
    assert!(
        seen.iter()
            .any(|m| m.is("ERROR") && m.last_arg() == Some("Protocol error. You must authenticate first."))
    );
    Ok(())
}

#[tokio::test]
async fn test_cap_req_is_all_or_nothing() -> anyhow::Result<()> {
    let bouncer = TestBouncer::start().await?;
    let mut client = TestClient::connect(&bouncer.address()).await?;

    let ls = cap(&mut client, "CAP LS 302").await?;
    assert_eq!(ls.arg(1), Some("LS"));
    let offered: Vec<&str> = ls.last_arg().unwrap_or("").split(' ').collect();
    assert!(offered.contains(&"sasl"));
    assert!(offered.contains(&"server-time"));

    let nak = cap(&mut client, "CAP REQ :server-time unknown-cap").await?;
    assert_eq!(nak.arg(1), Some("NAK"));
    assert_eq!(nak.last_arg(), Some("server-time unknown-cap"));

    let list = cap(&mut client, "CAP LIST").await?;
    assert_eq!(list.last_arg().unwrap_or(""), "");

    let ack = cap(&mut client, "CAP REQ :server-time").await?;
    assert_eq!(ack.arg(1), Some("ACK"));
    let list = cap(&mut client, "CAP LIST").await?;
    assert_eq!(list.last_arg(), Some("server-time"));
    Ok(())
}

#[tokio::test]
async fn test_sasl_plain_login() -> anyhow::Result<()> {
    let (bouncer, _upstream, _link) = setup().await?;
    let mut client = TestClient::connect(&bouncer.address()).await?;

    cap(&mut client, "CAP LS 302").await?;
    let ack = cap(&mut client, "CAP REQ :sasl").await?;
    assert_eq!(ack.arg(1), Some("ACK"));

    client.send_raw("AUTHENTICATE PLAIN").await?;
    let challenge = client.recv_until(|m| m.is("AUTHENTICATE")).await?.pop().expect("match");
    assert_eq!(challenge.arg(0), Some("+"));

    let payload = STANDARD.encode(b"\0alice@libera:tablet\0hunter2");
    client.send_raw(&format!("AUTHENTICATE {payload}")).await?;
    client.recv_numeric(900).await?;
    client.recv_numeric(903).await?;

    client.send_raw("CAP END").await?;
    client.send_raw("NICK alice").await?;
    client.send_raw("USER x 0 * :Test User").await?;
    client.recv_numeric(376).await?;
    bouncer.wait_for_devices("alice", "libera", &["tablet"]).await?;
    Ok(())
}

#[tokio::test]
async fn test_sasl_bad_credentials() -> anyhow::Result<()> {
    let bouncer = TestBouncer::start().await?;
    bouncer.add_user("alice", "hunter2", Role::User).await?;
    let mut client = TestClient::connect(&bouncer.address()).await?;

    cap(&mut client, "CAP REQ :sasl").await?;
    client.send_raw("AUTHENTICATE PLAIN").await?;
    client.recv_until(|m| m.is("AUTHENTICATE")).await?;
    let payload = STANDARD.encode(b"\0alice@libera\0nope");
    client.send_raw(&format!("AUTHENTICATE {payload}")).await?;
    client.recv_numeric(904).await?;

    client.send_raw("AUTHENTICATE FANCY-MECH").await?;
    let fail = client.recv_numeric(904).await?.pop().expect("match");
    assert_eq!(fail.last_arg(), Some("SASL mechanism not supported"));
    Ok(())
}

#[tokio::test]
async fn test_admin_console() -> anyhow::Result<()> {
    let bouncer = TestBouncer::start().await?;
    bouncer.add_user("root", "toor", Role::Admin).await?;
    let upstream = FakeUpstream::bind().await?;
    bouncer.add_network("root", "libera", upstream.addr()?).await?;
    let (_link, _) = upstream.accept_registered().await?;

    let mut console = bouncer.login("root", "root", "toor").await?;
    let welcome = console.recv_numeric(1).await?.pop().expect("match");
    assert_eq!(welcome.last_arg(), Some("Welcome to the slbnc admin console"));
    console.recv_numeric(376).await?;

    console.send_raw("PRIVMSG -slbnc :sessions").await?;
    let reply = console.recv_until(|m| m.is("PRIVMSG")).await?.pop().expect("match");
    assert!(reply.prefix.as_deref().is_some_and(|p| p.starts_with("-slbnc!")));
    assert!(reply.last_arg().is_some_and(|t| t.starts_with("root@libera:")));

    console.send_raw("SLBNC networks").await?;
    let reply = console.recv_until(|m| m.is("PRIVMSG")).await?.pop().expect("match");
    assert_eq!(reply.last_arg(), Some("libera (private)"));

    console.send_raw("JOIN #rust").await?;
    let reply = console.recv_until(|m| m.is("PRIVMSG")).await?.pop().expect("match");
    assert_eq!(reply.last_arg(), Some("You must connect to an IRC network to do that."));
    Ok(())
}
