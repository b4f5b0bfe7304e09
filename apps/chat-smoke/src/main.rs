mod config;
mod logging;

use std::{process::ExitCode, sync::Arc};

use chat_core::{ChatEvent, ChatMessage, EventChannelError, next_event};
use chat_services::{HttpMessageService, HttpUserService};
use chat_session::ChatSession;
use config::SmokeConfig;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            eprintln!("Required: CHAT_USER and CHAT_PASSWORD (CHAT_API_URL defaults to http://localhost:5000)");
            return ExitCode::FAILURE;
        }
    };

    let (users, messages) = match (
        HttpUserService::new(&config.api_url),
        HttpMessageService::new(&config.api_url),
    ) {
        (Ok(users), Ok(messages)) => (users, messages),
        (Err(err), _) | (_, Err(err)) => {
            error!(%err, "failed to build chat api clients");
            return ExitCode::FAILURE;
        }
    };

    let session = ChatSession::with_config(
        Arc::new(users),
        Arc::new(messages),
        config.session.clone(),
    );

    let authenticated = if config.create_account {
        session.create_user(&config.username, &config.password).await
    } else {
        session.login(&config.username, &config.password).await
    };
    match authenticated {
        Ok(true) => info!(user = %config.username, api = %config.api_url, "authenticated"),
        Ok(false) => {
            error!(user = %config.username, "credentials rejected");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            error!(%err, "invalid credentials input");
            return ExitCode::FAILURE;
        }
    }

    let mut events = session.subscribe();
    if !session.connect() {
        error!("session did not connect");
        return ExitCode::FAILURE;
    }

    if let Some(body) = &config.message {
        if session.send_message(body).await {
            info!("smoke message sent");
        } else {
            warn!("smoke message was not accepted");
        }
    }

    println!("Connected as {}. Press Ctrl-C to quit.", config.username);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = next_event(&mut events) => match event {
                Ok(event) => render(&event),
                Err(EventChannelError::Lagged(missed)) => warn!(missed, "event stream lagged"),
                Err(EventChannelError::Closed) => break,
            },
        }
    }

    session.shutdown().await;
    ExitCode::SUCCESS
}

fn render(event: &ChatEvent) {
    match event {
        ChatEvent::NewMessage { messages } => {
            for message in messages {
                println!("{}", line(message));
            }
        }
        ChatEvent::OverwriteLastLine { message } => println!("(last) {}", line(message)),
        ChatEvent::StateChanged { state } => info!(?state, "session state changed"),
    }
}

fn line(message: &ChatMessage) -> String {
    format!(
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        message.author,
        message.body
    )
}
