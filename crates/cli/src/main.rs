//! Bitebox CLI - shop the Bitebox storefront from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Who am I? (guest id or logged-in user)
//! bb identity
//!
//! # Cart
//! bb cart show
//! bb cart add 42 --size 2 --quantity 1
//! bb cart change 7 -- -1
//! bb cart set 7 3
//! bb cart remove 7
//!
//! # Offers
//! bb offers list
//! bb offer redeem 11 --size 2 --buy 42 --free 43
//!
//! # Checkout and payment
//! bb checkout --name "Ana" --phone 555-0100 --address "1 Main St" --payment online
//! bb payment verify cs_test_123
//! ```
//!
//! Configuration comes from the environment; see
//! [`bitebox_storefront::config`].

#![cfg_attr(not(test), forbid(unsafe_code))]

use bitebox_core::{LineId, OfferId, PaymentMethod, ProductId, SizeId};
use bitebox_storefront::config::StorefrontConfig;
use bitebox_storefront::{SessionContext, SessionError};
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "bb")]
#[command(author, version, about = "Bitebox storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current shopper identity
    Identity,
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Browse offers
    Offers {
        #[command(subcommand)]
        action: OffersAction,
    },
    /// Redeem an offer
    Offer {
        #[command(subcommand)]
        action: OfferAction,
    },
    /// Place an order for the cart
    Checkout {
        /// Customer name
        #[arg(short, long)]
        name: String,

        /// Contact phone number
        #[arg(short, long)]
        phone: String,

        /// Delivery address
        #[arg(short, long)]
        address: String,

        /// Email for the receipt
        #[arg(short, long)]
        email: Option<String>,

        /// Notes for the kitchen or courier
        #[arg(long)]
        notes: Option<String>,

        /// Payment method (`cash_on_delivery`, `cod`, `online`)
        #[arg(long, default_value = "cash_on_delivery")]
        payment: PaymentMethod,
    },
    /// Payment sessions
    Payment {
        #[command(subcommand)]
        action: PaymentAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart lines and totals
    Show,
    /// Add a product
    Add {
        product_id: ProductId,

        #[arg(short, long)]
        size: Option<SizeId>,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Change a line's quantity by a signed amount
    Change {
        line_id: LineId,

        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Set a line's quantity (anything below 1 becomes 1)
    Set { line_id: LineId, quantity: String },
    /// Remove a line
    Remove { line_id: LineId },
}

#[derive(Subcommand)]
enum OffersAction {
    /// List published offers
    List,
}

#[derive(Subcommand)]
enum OfferAction {
    /// Select a size and items, then place the offer order
    Redeem {
        offer_id: OfferId,

        #[arg(short, long)]
        size: SizeId,

        /// Items to buy (repeat for each item)
        #[arg(short, long, num_args = 1..)]
        buy: Vec<ProductId>,

        /// Free items (repeat for each item)
        #[arg(short, long, num_args = 0..)]
        free: Vec<ProductId>,
    },
}

#[derive(Subcommand)]
enum PaymentAction {
    /// Verify a payment session after returning from the payment page
    Verify {
        session_id: String,

        /// Guest id the order was placed with (defaults to this device's)
        #[arg(short, long)]
        guest_id: Option<String>,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Initialize tracing with `EnvFilter` and Sentry integration.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bitebox_storefront=info,bitebox_cli=info".into());

    let json = std::env::var("BITEBOX_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().without_time().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let ctx = match SessionContext::connect(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("Failed to start session: {e}");
            std::process::exit(1);
        }
    };

    let result = run(&ctx, cli.command).await;

    // Edits made by this invocation must reach the backend before exit.
    let flushed = ctx.cart().flush().await;

    if let Err(e) = result.and(flushed) {
        e.capture();
        tracing::error!("Command failed: {}", e.user_message());
        std::process::exit(1);
    }
}

async fn run<A>(ctx: &SessionContext<A>, command: Commands) -> Result<(), SessionError>
where
    A: bitebox_storefront::api::CommerceApi,
{
    bitebox_storefront::error::set_sentry_user(&ctx.identity().resolve());

    match command {
        Commands::Identity => commands::identity::show(ctx),
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(ctx).await,
            CartAction::Add {
                product_id,
                size,
                quantity,
            } => commands::cart::add(ctx, product_id, size, quantity).await,
            CartAction::Change { line_id, delta } => {
                commands::cart::change(ctx, line_id, delta).await
            }
            CartAction::Set { line_id, quantity } => {
                commands::cart::set(ctx, line_id, &quantity).await
            }
            CartAction::Remove { line_id } => commands::cart::remove(ctx, line_id).await,
        },
        Commands::Offers {
            action: OffersAction::List,
        } => commands::offers::list(ctx).await,
        Commands::Offer {
            action:
                OfferAction::Redeem {
                    offer_id,
                    size,
                    buy,
                    free,
                },
        } => commands::offers::redeem(ctx, offer_id, size, &buy, &free).await,
        Commands::Checkout {
            name,
            phone,
            address,
            email,
            notes,
            payment,
        } => {
            let details = bitebox_storefront::api::CheckoutDetails {
                customer_name: name,
                phone,
                email,
                delivery_address: address,
                notes,
                payment_method: payment,
            };
            commands::checkout::place(ctx, &details).await
        }
        Commands::Payment {
            action:
                PaymentAction::Verify {
                    session_id,
                    guest_id,
                },
        } => commands::payment::verify(ctx, &session_id, guest_id.as_deref()).await,
    }
}
