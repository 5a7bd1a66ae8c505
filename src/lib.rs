pub mod dropfolder_core;
