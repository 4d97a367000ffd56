use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "mailswitch";

/// Save the mailbox password into the OS keyring for the given username
pub fn save_password(username: &str, password: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, username);
    entry?
        .set_password(password)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load the mailbox password from the keyring for the given username
pub fn load_password(username: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, username);
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}
