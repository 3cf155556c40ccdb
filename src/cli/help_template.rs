use indoc::indoc;

// Help text template with placeholder
pub const HELP_TEMPLATE: &str = indoc! {r#"
    Examples:
      # Storing a value explicitly
      %BINARY_NAME% set mykey "Hello, world!"

      # Storing a value from stdin
      echo "Hello, world!" | %BINARY_NAME% set mykey
      cat file.bin | %BINARY_NAME% --dir ./cache set mykey

      # Reading a value
      %BINARY_NAME% get mykey

      # Removing a key
      %BINARY_NAME% remove mykey

      # Listing keys and occupancy
      %BINARY_NAME% keys
      %BINARY_NAME% info

      # Dropping everything
      %BINARY_NAME% clear

    Log verbosity is controlled with RUST_LOG (e.g. RUST_LOG=debug).
"#};
