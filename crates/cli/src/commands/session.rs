//! Sign-in commands.
//!
//! # Usage
//!
//! ```bash
//! atelier login -e layla@maison.example -p '...'
//! atelier whoami
//! atelier logout
//! ```

use secrecy::SecretString;

use atelier_client::{Backend, Storefront};

use crate::error::{CliError, clear_sentry_user, set_sentry_user};

/// Sign in and load the user's cart.
pub async fn login<A: Backend>(
    storefront: &Storefront<A>,
    email: &str,
    password: String,
) -> Result<(), CliError> {
    let password = SecretString::from(password);
    let user = storefront.login(email, &password).await?;
    set_sentry_user(&user.id);

    println!("Signed in as {} ({})", user.display_name, user.role);
    if !user.email_verified {
        println!("Your email address is not verified yet.");
    }

    let cart = storefront.cart().snapshot();
    if !cart.is_empty() {
        println!("Your cart has {} item(s).", cart.item_count);
    }
    Ok(())
}

/// Sign out. Always succeeds locally.
pub async fn logout<A: Backend>(storefront: &Storefront<A>) {
    let was_signed_in = storefront.session().is_authenticated();
    storefront.logout().await;
    clear_sentry_user();

    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
}

/// Print the current identity.
pub fn whoami<A: Backend>(storefront: &Storefront<A>) {
    match storefront.session().user() {
        Some(user) => {
            println!("{} <{}>", user.display_name, user.id);
            println!("role: {}", user.role);
            if let Some(email) = &user.email {
                println!("email: {email}");
            }
        }
        None => println!("Guest (not signed in)"),
    }
}
