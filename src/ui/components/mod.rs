pub mod connect_form;
pub mod input_bar;
pub mod message_list;
