use log::debug;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::blocking::Client;
use std::time::Duration;

use crate::error::DeviceError;
use crate::switch::{Power, SwitchDevice, SwitchDriver};

const BASICEVENT: &str = "urn:Belkin:service:basicevent:1";

/// Ports WeMo firmware has been seen serving `setup.xml` on, most common first.
const SETUP_PORTS: [u16; 5] = [49153, 49152, 49154, 49151, 49155];

/// Belkin WeMo switch reached by IP address.
pub struct WemoDriver {
    address: String,
    http: Client,
}

impl WemoDriver {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self, DeviceError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            address: address.into(),
            http,
        })
    }
}

impl SwitchDriver for WemoDriver {
    fn connect(&self) -> Result<Box<dyn SwitchDevice>, DeviceError> {
        for port in SETUP_PORTS {
            let base = format!("http://{}:{}", self.address, port);
            let resp = match self
                .http
                .get(format!("{base}/setup.xml"))
                .send()
                .and_then(|r| r.error_for_status())
            {
                Ok(r) => r,
                Err(e) => {
                    debug!("no setup.xml at {base}: {e}");
                    continue;
                }
            };

            let desc = DeviceDescription::parse(&resp.text()?)?;
            let path = desc.control_url.trim_start_matches('/');
            return Ok(Box::new(WemoSwitch {
                name: desc.friendly_name.unwrap_or_else(|| self.address.clone()),
                control_url: format!("{base}/{path}"),
                http: self.http.clone(),
            }));
        }

        Err(DeviceError::Unreachable {
            address: self.address.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: Option<String>,
    /// Control URL of the basicevent service.
    pub control_url: String,
}

impl DeviceDescription {
    pub fn parse(xml: &str) -> Result<Self, DeviceError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut friendly_name = None;
        let mut service_type: Option<String> = None;
        let mut control_url: Option<String> = None;
        let mut basicevent_url = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
                Ok(Event::End(_)) => {
                    if path.last().map(String::as_str) == Some("service") {
                        if service_type.as_deref() == Some(BASICEVENT) && basicevent_url.is_none() {
                            basicevent_url = control_url.take();
                        }
                        service_type = None;
                        control_url = None;
                    }
                    path.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| DeviceError::Description(e.to_string()))?
                        .into_owned();
                    match path.last().map(String::as_str) {
                        Some("friendlyName") if friendly_name.is_none() => {
                            friendly_name = Some(text)
                        }
                        Some("serviceType") => service_type = Some(text),
                        Some("controlURL") => control_url = Some(text),
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(DeviceError::Description(e.to_string())),
            }
        }

        let control_url = basicevent_url
            .ok_or_else(|| DeviceError::Description(format!("no {BASICEVENT} service")))?;
        Ok(Self {
            friendly_name,
            control_url,
        })
    }
}

struct WemoSwitch {
    name: String,
    control_url: String,
    http: Client,
}

impl SwitchDevice for WemoSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_power(&self, power: Power) -> Result<(), DeviceError> {
        let resp = self
            .http
            .post(&self.control_url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPACTION", format!("\"{BASICEVENT}#SetBinaryState\""))
            .body(set_binary_state_body(power))
            .send()?
            .error_for_status()?;
        debug!("{} -> {:?}: {}", self.name, power, resp.status());
        Ok(())
    }
}

fn set_binary_state_body(power: Power) -> String {
    let state = match power {
        Power::On => 1,
        Power::Off => 0,
    };
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body>"#,
            r#"<u:SetBinaryState xmlns:u="{service}"><BinaryState>{state}</BinaryState>"#,
            r#"</u:SetBinaryState></s:Body></s:Envelope>"#
        ),
        service = BASICEVENT,
        state = state
    )
}
