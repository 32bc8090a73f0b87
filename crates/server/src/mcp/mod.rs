pub mod tool_server;
